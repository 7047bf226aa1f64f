pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- artists table
CREATE TABLE IF NOT EXISTS artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    folder_name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    platform_user_id TEXT NOT NULL,
    service TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(platform, folder_name)
);

CREATE INDEX IF NOT EXISTS idx_artists_platform ON artists(platform);

-- posts table
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    remote_id TEXT NOT NULL,
    folder_name TEXT NOT NULL,
    title TEXT NOT NULL,
    cover_attachment TEXT,
    published_at TEXT,
    attachment_count INTEGER NOT NULL DEFAULT 0,
    viewed INTEGER NOT NULL DEFAULT 0,
    imported_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(artist_id, folder_name)
);

CREATE INDEX IF NOT EXISTS idx_posts_artist_id ON posts(artist_id);
CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_posts_artist_viewed ON posts(artist_id, viewed);

-- attachments table
CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    UNIQUE(post_id, position)
);

CREATE INDEX IF NOT EXISTS idx_attachments_post_id ON attachments(post_id);
"#;
