use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub artist_id: i64,
    /// Post id on the originating platform.
    pub remote_id: String,
    pub title: String,
    pub folder_name: String,
    pub cover_attachment: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub attachment_count: i64,
    pub viewed: bool,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub remote_id: String,
    pub title: String,
    pub folder_name: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Positional attachment file names, in display order.
    pub attachments: Vec<String>,
}

/// Outcome of writing a post's viewed flag, with the owning artist's
/// aggregate read before and after the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewedChange {
    pub artist_id: i64,
    pub post_id: i64,
    pub post_was_viewed: bool,
    pub artist_had_unviewed: bool,
    pub artist_has_unviewed: bool,
}

impl ViewedChange {
    pub fn artist_flag_changed(&self) -> bool {
        self.artist_had_unviewed != self.artist_has_unviewed
    }
}

/// Published once per post entered by a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewedEvent {
    pub artist_id: i64,
    pub post_id: i64,
    pub artist_flag_changed: bool,
    pub artist_has_unviewed: bool,
}

impl From<ViewedChange> for ViewedEvent {
    fn from(change: ViewedChange) -> Self {
        Self {
            artist_id: change.artist_id,
            post_id: change.post_id,
            artist_flag_changed: change.artist_flag_changed(),
            artist_has_unviewed: change.artist_has_unviewed,
        }
    }
}
