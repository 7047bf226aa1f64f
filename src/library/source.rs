use std::future::Future;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Artist, Platform, Post, PostQuery, ViewedChange};

/// What a viewer session needs from storage. Implemented by [`Library`] for
/// every platform and by in-memory doubles in tests.
pub trait ContentSource: Send + Sync + 'static {
    fn list_artists(&self) -> impl Future<Output = Result<Vec<Artist>>> + Send;

    fn list_posts(&self, artist_id: i64) -> impl Future<Output = Result<Vec<Post>>> + Send;

    fn list_attachments(&self, post_id: i64) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn mark_viewed(&self, post_id: i64) -> impl Future<Output = Result<ViewedChange>> + Send;
}

/// Repository-backed source for one platform and one list configuration.
///
/// When the database could not be opened the library is `unavailable`: reads
/// come back empty and writes fail with `StoreUnavailable`, which callers log.
#[derive(Clone)]
pub struct Library {
    repo: Option<Repository>,
    platform: Platform,
    query: PostQuery,
}

impl Library {
    pub fn new(repo: Repository, platform: Platform, query: PostQuery) -> Self {
        Self {
            repo: Some(repo),
            platform,
            query,
        }
    }

    pub fn unavailable(platform: Platform, query: PostQuery) -> Self {
        Self {
            repo: None,
            platform,
            query,
        }
    }

    pub async fn set_post_viewed(&self, post_id: i64, viewed: bool) -> Result<ViewedChange> {
        match &self.repo {
            Some(repo) => repo.set_post_viewed(post_id, viewed).await,
            None => Err(AppError::StoreUnavailable("no database".to_string())),
        }
    }

    pub async fn set_artist_all_posts_viewed(&self, artist_id: i64, viewed: bool) -> Result<()> {
        match &self.repo {
            Some(repo) => repo.set_artist_all_posts_viewed(artist_id, viewed).await,
            None => Err(AppError::StoreUnavailable("no database".to_string())),
        }
    }
}

impl ContentSource for Library {
    async fn list_artists(&self) -> Result<Vec<Artist>> {
        match &self.repo {
            Some(repo) => repo.get_artists(self.platform, self.query.only_unviewed).await,
            None => Ok(Vec::new()),
        }
    }

    async fn list_posts(&self, artist_id: i64) -> Result<Vec<Post>> {
        match &self.repo {
            Some(repo) => repo.get_posts(artist_id, self.query).await,
            None => Ok(Vec::new()),
        }
    }

    async fn list_attachments(&self, post_id: i64) -> Result<Vec<String>> {
        match &self.repo {
            Some(repo) => repo.get_attachment_names(post_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn mark_viewed(&self, post_id: i64) -> Result<ViewedChange> {
        self.set_post_viewed(post_id, true).await
    }
}
