use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::Platform;

use super::scan::{scan_artist, sub_directories};

const MAX_CONCURRENT_SCANS: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub artists: usize,
    pub posts: usize,
    pub failed: usize,
}

/// Scans every artist folder under `root` and imports each one in its own
/// transaction. A failing artist is logged and skipped; the others still land.
pub async fn import_root(repo: &Repository, root: &Path, platform: Platform) -> Result<ImportSummary> {
    let root_owned = root.to_path_buf();
    let artist_dirs = tokio::task::spawn_blocking(move || sub_directories(&root_owned))
        .await
        .map_err(|e| AppError::Other(e.into()))??;

    let scans: Vec<(PathBuf, Result<_>)> = stream::iter(artist_dirs)
        .map(|dir| async move {
            let scan_dir = dir.clone();
            let result = tokio::task::spawn_blocking(move || scan_artist(&scan_dir, platform))
                .await
                .map_err(|e| AppError::Other(e.into()))
                .and_then(|r| r);
            (dir, result)
        })
        .buffer_unordered(MAX_CONCURRENT_SCANS)
        .collect()
        .await;

    let mut summary = ImportSummary::default();
    for (dir, scan) in scans {
        let scanned = match scan {
            Ok(scanned) => scanned,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to scan artist folder");
                summary.failed += 1;
                continue;
            }
        };

        let post_count = scanned.posts.len();
        match repo.import_artist(platform, scanned.artist, scanned.posts).await {
            Ok(_) => {
                summary.artists += 1;
                summary.posts += post_count;
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to import artist");
                summary.failed += 1;
            }
        }
    }

    info!(
        platform = platform.as_str(),
        artists = summary.artists,
        posts = summary.posts,
        failed = summary.failed,
        "library import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostQuery;
    use std::fs;

    #[tokio::test]
    async fn imports_every_artist_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("twitter");
        for (artist, post, files) in [
            ("alice", "1700000000", vec!["1.jpg", "2.jpg"]),
            ("alice", "1700000100", vec![]),
            ("bob", "1700000200", vec!["1.png"]),
        ] {
            let dir = root.join(artist).join(post);
            fs::create_dir_all(&dir).unwrap();
            for f in files {
                fs::write(dir.join(f), b"x").unwrap();
            }
        }

        let repo = Repository::new(tmp.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap();
        let summary = import_root(&repo, &root, Platform::Twitter).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                artists: 2,
                posts: 3,
                failed: 0
            }
        );

        let artists = repo.get_artists(Platform::Twitter, false).await.unwrap();
        assert_eq!(artists.len(), 2);
        assert!(artists.iter().all(|a| a.has_unviewed));

        let alice = artists.iter().find(|a| a.folder_name == "alice").unwrap();
        let posts = repo.get_posts(alice.id, PostQuery::default()).await.unwrap();
        assert_eq!(posts.len(), 2);
    }

    #[tokio::test]
    async fn broken_manifest_skips_only_that_artist() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("kemono");
        fs::create_dir_all(root.join("good").join("p1")).unwrap();
        fs::write(root.join("good").join("p1").join("1.png"), b"x").unwrap();
        fs::create_dir_all(root.join("bad").join("p1")).unwrap();
        fs::write(root.join("bad").join("artist.json"), b"{ not json").unwrap();

        let repo = Repository::new(tmp.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap();
        let summary = import_root(&repo, &root, Platform::Kemono).await.unwrap();
        assert_eq!(summary.artists, 1);
        assert_eq!(summary.failed, 1);

        let artists = repo.get_artists(Platform::Kemono, false).await.unwrap();
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].folder_name, "good");
    }
}
