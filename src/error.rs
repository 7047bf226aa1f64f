use thiserror::Error;

/// Failures while turning an animated file into frames.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open container: {0}")]
    CannotOpenContainer(String),

    #[error("archive has no frame manifest")]
    MissingManifest,

    #[error("frame {0} is missing or unreadable")]
    MissingFrame(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Nothing to display")]
    NoContent,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
