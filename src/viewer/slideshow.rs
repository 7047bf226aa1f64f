use std::time::Duration;

use tokio::time::Instant;

/// Decides when an automatic slideshow moves to the next image.
///
/// Still images stay up for `interval`. Animations stay up until one full
/// loop has played when `waits_for_animation` is set, else for `interval`.
#[derive(Debug, Clone)]
pub struct Slideshow {
    interval: Duration,
    waits_for_animation: bool,
    shown_at: Instant,
    loop_completed: bool,
}

impl Slideshow {
    pub fn new(interval: Duration, waits_for_animation: bool, now: Instant) -> Self {
        Self {
            interval,
            waits_for_animation,
            shown_at: now,
            loop_completed: false,
        }
    }

    /// A new attachment is on screen.
    pub fn restart(&mut self, now: Instant) {
        self.shown_at = now;
        self.loop_completed = false;
    }

    pub fn on_loop_completed(&mut self) {
        self.loop_completed = true;
    }

    pub fn should_advance(&self, now: Instant, animated: bool) -> bool {
        if animated && self.waits_for_animation {
            return self.loop_completed;
        }
        now.saturating_duration_since(self.shown_at) >= self.interval
    }
}
