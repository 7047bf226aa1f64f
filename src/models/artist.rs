use serde::{Deserialize, Serialize};

use super::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: i64,
    pub platform: Platform,
    pub display_name: String,
    pub platform_user_id: String,
    pub service: String,
    pub folder_name: String,
    /// Derived at read time: any owned post still has `viewed = false`.
    pub has_unviewed: bool,
}

#[derive(Debug, Clone)]
pub struct NewArtist {
    pub display_name: String,
    pub platform_user_id: String,
    pub service: String,
    pub folder_name: String,
}
