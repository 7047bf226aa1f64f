use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{Platform, PostQuery, PostSort, SortKey, SortOrder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub kemono_root: Option<PathBuf>,
    pub twitter_root: Option<PathBuf>,
    pub pixiv_root: Option<PathBuf>,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default = "default_slideshow_interval")]
    pub slideshow_interval_secs: u64,

    #[serde(default = "default_true")]
    pub slideshow_waits_for_animation: bool,

    #[serde(default = "default_kemono_api_base")]
    pub kemono_api_base: String,

    #[serde(default = "default_pixiv_api_base")]
    pub pixiv_api_base: String,
}

/// Sort and filter choices for the artist and post lists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewConfig {
    #[serde(default)]
    pub sort_key: SortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub only_unviewed: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            sort_key: SortKey::Published,
            sort_order: SortOrder::Descending,
            only_unviewed: false,
        }
    }
}

impl ViewConfig {
    pub fn post_query(&self) -> PostQuery {
        PostQuery {
            sort: PostSort {
                key: self.sort_key,
                order: self.sort_order,
            },
            only_unviewed: self.only_unviewed,
        }
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("creator-shelf");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("library.db").to_string_lossy().to_string()
}

fn default_slideshow_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_kemono_api_base() -> String {
    "https://kemono.su".to_string()
}

fn default_pixiv_api_base() -> String {
    "https://www.pixiv.net".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            kemono_root: None,
            twitter_root: None,
            pixiv_root: None,
            view: ViewConfig::default(),
            slideshow_interval_secs: default_slideshow_interval(),
            slideshow_waits_for_animation: true,
            kemono_api_base: default_kemono_api_base(),
            pixiv_api_base: default_pixiv_api_base(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("creator-shelf")
            .join("config.toml")
    }

    /// Base directory holding the mirrored tree for `platform`, if configured.
    pub fn root_for(&self, platform: Platform) -> Option<&PathBuf> {
        match platform {
            Platform::Kemono => self.kemono_root.as_ref(),
            Platform::Twitter => self.twitter_root.as_ref(),
            Platform::Pixiv => self.pixiv_root.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/shelf.db"
            pixiv_root = "/data/pixiv"

            [view]
            only_unviewed = true
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/shelf.db");
        assert_eq!(config.root_for(Platform::Pixiv), Some(&PathBuf::from("/data/pixiv")));
        assert_eq!(config.root_for(Platform::Kemono), None);
        assert_eq!(config.slideshow_interval_secs, 5);
        assert!(config.slideshow_waits_for_animation);
        assert!(config.view.only_unviewed);
        assert_eq!(config.view.sort_key, SortKey::Published);
        assert_eq!(config.view.sort_order, SortOrder::Descending);
    }

    #[test]
    fn sort_settings_round_trip_through_toml() {
        let mut config = Config::default();
        config.view.sort_key = SortKey::Title;
        config.view.sort_order = SortOrder::Ascending;

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("sort_key = \"title\""));

        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.view, config.view);
    }
}
