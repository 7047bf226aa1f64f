use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::REFERER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Artist, Platform, Post};

const USER_AGENT_STRING: &str = concat!("creator-shelf/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub commenter_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub translation: Option<String>,
}

/// Extra post information shown beside the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDetails {
    Comments(Vec<Comment>),
    Tags(Vec<Tag>),
}

#[derive(Debug, Deserialize)]
struct PixivResponse {
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<PixivIllust>,
}

#[derive(Debug, Deserialize)]
struct PixivIllust {
    tags: PixivTags,
}

#[derive(Debug, Deserialize)]
struct PixivTags {
    #[serde(default)]
    tags: Vec<PixivTag>,
}

#[derive(Debug, Deserialize)]
struct PixivTag {
    tag: String,
    #[serde(default)]
    translation: Option<HashMap<String, String>>,
}

impl From<PixivTag> for Tag {
    fn from(tag: PixivTag) -> Self {
        Tag {
            translation: tag.translation.and_then(|mut t| t.remove("en")),
            name: tag.tag,
        }
    }
}

/// Fetches comments (Kemono) and tags (Pixiv) for a post. Twitter has no
/// endpoint.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    kemono_base: Url,
    pixiv_base: Url,
}

impl RemoteClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT_STRING)
            .build()?;

        Ok(Self {
            client,
            kemono_base: parse_base(&config.kemono_api_base)?,
            pixiv_base: parse_base(&config.pixiv_api_base)?,
        })
    }

    pub fn comments_url(&self, service: &str, user_id: &str, post_id: &str) -> Result<Url> {
        let path = format!(
            "api/v1/{}/user/{}/post/{}/comments",
            urlencoding::encode(service),
            urlencoding::encode(user_id),
            urlencoding::encode(post_id)
        );
        endpoint(&self.kemono_base, &path)
    }

    pub fn tags_url(&self, post_id: &str) -> Result<Url> {
        let path = format!("ajax/illust/{}", urlencoding::encode(post_id));
        endpoint(&self.pixiv_base, &path)
    }

    pub async fn fetch_details(&self, artist: &Artist, post: &Post) -> Result<RemoteDetails> {
        match artist.platform {
            Platform::Kemono => self
                .fetch_comments(&artist.service, &artist.platform_user_id, &post.remote_id)
                .await
                .map(RemoteDetails::Comments),
            Platform::Pixiv => self
                .fetch_tags(&post.remote_id)
                .await
                .map(RemoteDetails::Tags),
            Platform::Twitter => Err(AppError::Fetch("unsupported".to_string())),
        }
    }

    pub async fn fetch_comments(
        &self,
        service: &str,
        user_id: &str,
        post_id: &str,
    ) -> Result<Vec<Comment>> {
        let url = self.comments_url(service, user_id, post_id)?;
        self.get_json(url).await
    }

    pub async fn fetch_tags(&self, post_id: &str) -> Result<Vec<Tag>> {
        let url = self.tags_url(post_id)?;
        let response: PixivResponse = self.get_json(url).await?;

        if response.error {
            return Err(AppError::Fetch(format!("pixiv: {}", response.message)));
        }
        let illust = response
            .body
            .ok_or_else(|| AppError::Fetch("pixiv: empty body".to_string()))?;

        Ok(illust.tags.tags.into_iter().map(Tag::from).collect())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!(%url, "remote fetch");

        let response = self
            .client
            .get(url.clone())
            .header(REFERER, self.pixiv_base.as_str())
            .send()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!("{url} returned {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Fetch(format!("{url}: {e}")))
    }
}

fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| AppError::Config(format!("invalid API base {base}: {e}")))
}

// Url::join drops the last path segment unless the base ends with '/'
fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| AppError::Config(format!("invalid endpoint {path}: {e}")))
}
