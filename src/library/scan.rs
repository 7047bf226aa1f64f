use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::models::{NewArtist, NewPost, Platform};

const ARTIST_MANIFEST: &str = "artist.json";
const POST_MANIFEST: &str = "post.json";

#[derive(Debug, Deserialize, Default)]
struct ArtistManifest {
    name: Option<String>,
    user_id: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PostManifest {
    id: Option<String>,
    title: Option<String>,
    published: Option<DateTime<Utc>>,
    attachments: Option<Vec<String>>,
}

/// One artist folder read from disk, ready for a single import transaction.
#[derive(Debug)]
pub struct ScannedArtist {
    pub artist: NewArtist,
    pub posts: Vec<NewPost>,
}

fn ordered_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.[A-Za-z0-9]+$").expect("valid attachment pattern"))
}

/// Reads an artist folder: optional `artist.json`, then one post per
/// sub-directory.
pub fn scan_artist(dir: &Path, platform: Platform) -> Result<ScannedArtist> {
    let folder_name = folder_name(dir);
    let manifest: ArtistManifest = read_manifest(&dir.join(ARTIST_MANIFEST))?.unwrap_or_default();

    let artist = NewArtist {
        display_name: manifest.name.unwrap_or_else(|| folder_name.clone()),
        platform_user_id: manifest.user_id.unwrap_or_else(|| folder_name.clone()),
        service: manifest
            .service
            .unwrap_or_else(|| platform.default_service().to_string()),
        folder_name,
    };

    let mut posts = Vec::new();
    for post_dir in sub_directories(dir)? {
        posts.push(scan_post(&post_dir)?);
    }
    debug!(artist = %artist.folder_name, posts = posts.len(), "scanned artist folder");

    Ok(ScannedArtist { artist, posts })
}

fn scan_post(dir: &Path) -> Result<NewPost> {
    let folder_name = folder_name(dir);
    let manifest: PostManifest = read_manifest(&dir.join(POST_MANIFEST))?.unwrap_or_default();

    let attachments = match manifest.attachments {
        Some(names) => names,
        None => ordered_attachments(dir)?,
    };

    Ok(NewPost {
        remote_id: manifest.id.unwrap_or_else(|| folder_name.clone()),
        title: manifest.title.unwrap_or_else(|| folder_name.clone()),
        folder_name,
        published_at: manifest.published,
        attachments,
    })
}

/// Files named `N.ext`, ordered by their sequence number.
fn ordered_attachments(dir: &Path) -> Result<Vec<String>> {
    let mut numbered: Vec<(u64, String)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(seq) = ordered_name_re()
            .captures(&name)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        {
            numbered.push((seq, name));
        }
    }
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

pub(super) fn sub_directories(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_dir() && !hidden {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn read_manifest<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn folder_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
