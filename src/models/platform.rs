use serde::{Deserialize, Serialize};

/// Content platform a mirrored artist belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kemono,
    Twitter,
    Pixiv,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Kemono, Platform::Twitter, Platform::Pixiv];

    /// Stored form used in the `artists.platform` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Kemono => "kemono",
            Platform::Twitter => "twitter",
            Platform::Pixiv => "pixiv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::Kemono => "Kemono",
            Platform::Twitter => "Twitter",
            Platform::Pixiv => "Pixiv",
        }
    }

    pub fn cycle(&self) -> Self {
        match self {
            Platform::Kemono => Platform::Twitter,
            Platform::Twitter => Platform::Pixiv,
            Platform::Pixiv => Platform::Kemono,
        }
    }

    /// Service tag recorded for artists whose folder carries no `artist.json`.
    pub fn default_service(&self) -> &'static str {
        match self {
            Platform::Kemono => "patreon",
            Platform::Twitter => "twitter",
            Platform::Pixiv => "pixiv",
        }
    }
}
