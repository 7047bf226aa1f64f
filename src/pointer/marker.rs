use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::library::ContentSource;
use crate::models::ViewedEvent;

/// Background writer for a pointer's viewed flags.
///
/// Posts are marked one at a time in the order they were entered, so the
/// aggregate artist flag is always read after the previous write landed.
/// Dropping the marker closes the queue; writes already queued still reach
/// the store, and events for a closed session are discarded.
pub(super) struct ViewedMarker {
    tx: mpsc::UnboundedSender<i64>,
}

impl ViewedMarker {
    pub(super) fn spawn<S: ContentSource>(
        source: Arc<S>,
        events: mpsc::UnboundedSender<ViewedEvent>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();

        tokio::spawn(async move {
            while let Some(post_id) = rx.recv().await {
                match source.mark_viewed(post_id).await {
                    Ok(change) => {
                        debug!(
                            post_id,
                            artist_id = change.artist_id,
                            artist_flag_changed = change.artist_flag_changed(),
                            "post marked viewed"
                        );
                        // Receiver gone means the viewer closed.
                        let _ = events.send(ViewedEvent::from(change));
                    }
                    Err(e) => {
                        warn!(post_id, error = %e, "failed to mark post viewed");
                    }
                }
            }
        });

        Self { tx }
    }

    pub(super) fn mark(&self, post_id: i64) {
        if self.tx.send(post_id).is_err() {
            warn!(post_id, "viewed marker stopped; dropping write");
        }
    }
}
