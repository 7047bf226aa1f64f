use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Artist, NewArtist, NewPost, Platform, Post, PostQuery, ViewedChange};

use super::schema::SCHEMA;

const ARTIST_COLUMNS: &str = r#"a.id, a.platform, a.display_name, a.platform_user_id, a.service, a.folder_name,
    EXISTS(SELECT 1 FROM posts p WHERE p.artist_id = a.id AND p.viewed = 0) AS has_unviewed"#;

const POST_COLUMNS: &str = "id, artist_id, remote_id, title, folder_name, cover_attachment, published_at, attachment_count, viewed";

/// Handle to the library database. Cloning shares the same background
/// connection thread.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Artist operations

    pub async fn get_artists(&self, platform: Platform, only_unviewed: bool) -> Result<Vec<Artist>> {
        let artists = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {ARTIST_COLUMNS}
                       FROM artists a
                       WHERE a.platform = ?1
                       ORDER BY a.display_name COLLATE NOCASE, a.id"#
                ))?;
                let artists = stmt
                    .query_map(params![platform.as_str()], artist_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(artists)
            })
            .await?;

        if only_unviewed {
            return Ok(artists.into_iter().filter(|a| a.has_unviewed).collect());
        }
        Ok(artists)
    }

    pub async fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        let artist = self
            .conn
            .call(move |conn| {
                let artist = conn
                    .query_row(
                        &format!("SELECT {ARTIST_COLUMNS} FROM artists a WHERE a.id = ?1"),
                        params![id],
                        artist_from_row,
                    )
                    .optional()?;
                Ok(artist)
            })
            .await?;
        Ok(artist)
    }

    /// Writes every post of the artist in one statement.
    pub async fn set_artist_all_posts_viewed(&self, artist_id: i64, viewed: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE posts SET viewed = ?1 WHERE artist_id = ?2",
                    params![viewed, artist_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Post operations

    pub async fn get_posts(&self, artist_id: i64, query: PostQuery) -> Result<Vec<Post>> {
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {POST_COLUMNS}
                       FROM posts
                       WHERE artist_id = ?1 AND (?2 = 0 OR viewed = 0)
                       ORDER BY {}"#,
                    query.sort.order_by()
                ))?;
                let posts = stmt
                    .query_map(params![artist_id, query.only_unviewed], post_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    pub async fn get_attachment_names(&self, post_id: i64) -> Result<Vec<String>> {
        let names = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM attachments WHERE post_id = ?1 ORDER BY position",
                )?;
                let names = stmt
                    .query_map(params![post_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }

    /// Sets a post's viewed flag and reports how the owning artist's
    /// aggregate flag moved. Writing the same value twice is harmless.
    pub async fn set_post_viewed(&self, post_id: i64, viewed: bool) -> Result<ViewedChange> {
        let change = self
            .conn
            .call(move |conn| {
                let (artist_id, post_was_viewed) = conn.query_row(
                    "SELECT artist_id, viewed FROM posts WHERE id = ?1",
                    params![post_id],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? != 0)),
                )?;
                let artist_had_unviewed = artist_has_unviewed(conn, artist_id)?;
                conn.execute(
                    "UPDATE posts SET viewed = ?1 WHERE id = ?2",
                    params![viewed, post_id],
                )?;
                let artist_has_unviewed = artist_has_unviewed(conn, artist_id)?;

                Ok(ViewedChange {
                    artist_id,
                    post_id,
                    post_was_viewed,
                    artist_had_unviewed,
                    artist_has_unviewed,
                })
            })
            .await?;
        Ok(change)
    }

    // Ingestion

    /// Upserts an artist with all of its posts and attachments in a single
    /// transaction. Existing viewed flags survive a re-import.
    pub async fn import_artist(
        &self,
        platform: Platform,
        artist: NewArtist,
        posts: Vec<NewPost>,
    ) -> Result<i64> {
        let artist_id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let artist_id: i64 = tx.query_row(
                    r#"INSERT INTO artists (platform, folder_name, display_name, platform_user_id, service)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(platform, folder_name) DO UPDATE SET
                           display_name = excluded.display_name,
                           platform_user_id = excluded.platform_user_id,
                           service = excluded.service,
                           updated_at = datetime('now')
                       RETURNING id"#,
                    params![
                        platform.as_str(),
                        artist.folder_name,
                        artist.display_name,
                        artist.platform_user_id,
                        artist.service,
                    ],
                    |row| row.get(0),
                )?;

                for post in &posts {
                    let post_id: i64 = tx.query_row(
                        r#"INSERT INTO posts (artist_id, remote_id, folder_name, title, cover_attachment, published_at, attachment_count)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                           ON CONFLICT(artist_id, folder_name) DO UPDATE SET
                               remote_id = excluded.remote_id,
                               title = excluded.title,
                               cover_attachment = excluded.cover_attachment,
                               published_at = excluded.published_at,
                               attachment_count = excluded.attachment_count
                           RETURNING id"#,
                        params![
                            artist_id,
                            post.remote_id,
                            post.folder_name,
                            post.title,
                            post.attachments.first(),
                            post.published_at.map(|dt| dt.to_rfc3339()),
                            post.attachments.len() as i64,
                        ],
                        |row| row.get(0),
                    )?;

                    tx.execute("DELETE FROM attachments WHERE post_id = ?1", params![post_id])?;
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO attachments (post_id, position, name) VALUES (?1, ?2, ?3)",
                    )?;
                    for (position, name) in post.attachments.iter().enumerate() {
                        stmt.execute(params![post_id, position as i64, name])?;
                    }
                }

                tx.commit()?;
                Ok(artist_id)
            })
            .await?;
        Ok(artist_id)
    }
}

fn artist_has_unviewed(conn: &SqliteConnection, artist_id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM posts WHERE artist_id = ?1 AND viewed = 0)",
        params![artist_id],
        |row| Ok(row.get::<_, i64>(0)? != 0),
    )
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 as written by ingestion (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    let platform: String = row.get(1)?;
    let platform = Platform::parse(&platform)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(1, "platform".to_string(), Type::Text))?;

    Ok(Artist {
        id: row.get(0)?,
        platform,
        display_name: row.get(2)?,
        platform_user_id: row.get(3)?,
        service: row.get(4)?,
        folder_name: row.get(5)?,
        has_unviewed: row.get::<_, i64>(6)? != 0,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        artist_id: row.get(1)?,
        remote_id: row.get(2)?,
        title: row.get(3)?,
        folder_name: row.get(4)?,
        cover_attachment: row.get(5)?,
        published_at: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_datetime(&s)),
        attachment_count: row.get(7)?,
        viewed: row.get::<_, i64>(8)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostSort, SortKey, SortOrder};
    use chrono::TimeZone;

    async fn repo_in(dir: &tempfile::TempDir) -> Repository {
        let path = dir.path().join("library.db");
        Repository::new(path.to_str().unwrap()).await.unwrap()
    }

    fn new_artist(folder: &str) -> NewArtist {
        NewArtist {
            display_name: folder.to_string(),
            platform_user_id: format!("{folder}-id"),
            service: "fanbox".to_string(),
            folder_name: folder.to_string(),
        }
    }

    fn new_post(folder: &str, day: u32, attachments: &[&str]) -> NewPost {
        NewPost {
            remote_id: folder.to_string(),
            title: format!("Post {folder}"),
            folder_name: folder.to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
            attachments: attachments.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn seeded() -> (tempfile::TempDir, Repository, i64) {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir).await;
        let artist_id = repo
            .import_artist(
                Platform::Kemono,
                new_artist("alice"),
                vec![
                    new_post("p1", 1, &["1.png", "2.png"]),
                    new_post("p2", 2, &[]),
                    new_post("p3", 3, &["1.gif"]),
                ],
            )
            .await
            .unwrap();
        (dir, repo, artist_id)
    }

    fn ascending() -> PostQuery {
        PostQuery {
            sort: PostSort {
                key: SortKey::Published,
                order: SortOrder::Ascending,
            },
            only_unviewed: false,
        }
    }

    #[tokio::test]
    async fn import_keeps_attachment_order() {
        let (_dir, repo, artist_id) = seeded().await;

        let posts = repo.get_posts(artist_id, ascending()).await.unwrap();
        let folders: Vec<_> = posts.iter().map(|p| p.folder_name.as_str()).collect();
        assert_eq!(folders, ["p1", "p2", "p3"]);
        assert_eq!(posts[0].attachment_count, 2);
        assert_eq!(posts[0].cover_attachment.as_deref(), Some("1.png"));
        assert_eq!(posts[1].cover_attachment, None);

        let names = repo.get_attachment_names(posts[0].id).await.unwrap();
        assert_eq!(names, ["1.png", "2.png"]);
        assert!(repo.get_attachment_names(posts[1].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn artist_flag_flips_only_on_last_unviewed_post() {
        let (_dir, repo, artist_id) = seeded().await;
        let posts = repo.get_posts(artist_id, ascending()).await.unwrap();

        let first = repo.set_post_viewed(posts[0].id, true).await.unwrap();
        assert!(!first.post_was_viewed);
        assert!(!first.artist_flag_changed());

        repo.set_post_viewed(posts[1].id, true).await.unwrap();
        let last = repo.set_post_viewed(posts[2].id, true).await.unwrap();
        assert!(last.artist_flag_changed());
        assert!(!last.artist_has_unviewed);

        let artist = repo.get_artist(artist_id).await.unwrap().unwrap();
        assert!(!artist.has_unviewed);

        let reopened = repo.set_post_viewed(posts[1].id, false).await.unwrap();
        assert!(reopened.artist_flag_changed());
        assert!(reopened.artist_has_unviewed);
    }

    #[tokio::test]
    async fn marking_viewed_twice_is_idempotent() {
        let (_dir, repo, artist_id) = seeded().await;
        let posts = repo.get_posts(artist_id, ascending()).await.unwrap();

        repo.set_post_viewed(posts[0].id, true).await.unwrap();
        let before = repo.get_posts(artist_id, ascending()).await.unwrap();
        let second = repo.set_post_viewed(posts[0].id, true).await.unwrap();
        let after = repo.get_posts(artist_id, ascending()).await.unwrap();

        assert_eq!(before, after);
        assert!(second.post_was_viewed);
        assert!(!second.artist_flag_changed());
    }

    #[tokio::test]
    async fn bulk_mark_cascades_and_filters_artists() {
        let (_dir, repo, artist_id) = seeded().await;
        repo.import_artist(Platform::Kemono, new_artist("bob"), vec![new_post("b1", 4, &["1.jpg"])])
            .await
            .unwrap();

        repo.set_artist_all_posts_viewed(artist_id, true).await.unwrap();

        let unviewed = repo.get_artists(Platform::Kemono, true).await.unwrap();
        let names: Vec<_> = unviewed.iter().map(|a| a.folder_name.as_str()).collect();
        assert_eq!(names, ["bob"]);

        let all = repo.get_artists(Platform::Kemono, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(repo.get_artists(Platform::Pixiv, false).await.unwrap().is_empty());

        let mut query = ascending();
        query.only_unviewed = true;
        assert!(repo.get_posts(artist_id, query).await.unwrap().is_empty());

        repo.set_artist_all_posts_viewed(artist_id, false).await.unwrap();
        assert_eq!(repo.get_posts(artist_id, query).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reimport_preserves_viewed_and_replaces_attachments() {
        let (_dir, repo, artist_id) = seeded().await;
        let posts = repo.get_posts(artist_id, ascending()).await.unwrap();
        repo.set_post_viewed(posts[0].id, true).await.unwrap();

        let again = repo
            .import_artist(
                Platform::Kemono,
                new_artist("alice"),
                vec![new_post("p1", 1, &["1.png", "2.png", "3.png"])],
            )
            .await
            .unwrap();
        assert_eq!(again, artist_id);

        let posts = repo.get_posts(artist_id, ascending()).await.unwrap();
        assert!(posts[0].viewed);
        assert_eq!(posts[0].attachment_count, 3);
        assert_eq!(
            repo.get_attachment_names(posts[0].id).await.unwrap(),
            ["1.png", "2.png", "3.png"]
        );
    }

    #[tokio::test]
    async fn descending_title_sort() {
        let (_dir, repo, artist_id) = seeded().await;
        let query = PostQuery {
            sort: PostSort {
                key: SortKey::Title,
                order: SortOrder::Descending,
            },
            only_unviewed: false,
        };
        let posts = repo.get_posts(artist_id, query).await.unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Post p3", "Post p2", "Post p1"]);
    }

    #[test]
    fn parses_both_stored_date_formats() {
        assert!(parse_datetime("2026-01-11T12:34:56+00:00").is_some());
        assert!(parse_datetime("2026-01-11 12:34:56").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
