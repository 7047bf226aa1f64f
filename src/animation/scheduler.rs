use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    ManuallyScrubbing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The last frame's duration elapsed and playback wrapped to frame 0.
    LoopCompleted,
}

#[derive(Debug)]
enum Control {
    Play,
    SetAutoPlay(bool),
    BeginScrub,
    ScrubTo(usize),
    EndScrub,
    Step(isize),
    SetDurations(Vec<Duration>),
}

/// One scheduled frame advancement.
#[derive(Debug, Clone, Copy)]
struct Pending {
    scheduled_at: Instant,
    nominal: Duration,
    due: Instant,
}

/// Frame clock without any runtime attached. Every method takes the current
/// instant so the timing rules can be driven directly.
#[derive(Debug)]
pub(crate) struct Playback {
    durations: Vec<Duration>,
    index: usize,
    state: PlaybackState,
    auto_play: bool,
    pending: Option<Pending>,
}

impl Playback {
    pub(crate) fn new(durations: Vec<Duration>, auto_play: bool) -> Self {
        Self {
            durations,
            index: 0,
            state: PlaybackState::Stopped,
            auto_play,
            pending: None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    pub(crate) fn due(&self) -> Option<Instant> {
        self.pending.map(|p| p.due)
    }

    fn schedule(&mut self, now: Instant, overrun: Duration) {
        let nominal = self.durations[self.index];
        self.pending = Some(Pending {
            scheduled_at: now,
            nominal,
            due: now + nominal.saturating_sub(overrun),
        });
    }

    fn halt(&mut self, state: PlaybackState) {
        self.state = state;
        self.pending = None;
    }

    pub(crate) fn play(&mut self, now: Instant) {
        if self.durations.is_empty() || self.state != PlaybackState::Stopped {
            return;
        }
        self.state = PlaybackState::Playing;
        self.schedule(now, Duration::ZERO);
    }

    /// Advances when the pending deadline has passed. Lateness against the
    /// nominal duration shortens the next wait only. Returns true on wrap.
    pub(crate) fn tick(&mut self, now: Instant) -> bool {
        let Some(pending) = self.pending else {
            return false;
        };
        if self.state != PlaybackState::Playing || now < pending.due {
            return false;
        }

        let elapsed = now.saturating_duration_since(pending.scheduled_at);
        let overrun = elapsed.saturating_sub(pending.nominal);
        self.index = (self.index + 1) % self.durations.len();
        self.schedule(now, overrun);

        trace!(frame = self.index, overrun_ms = overrun.as_millis() as u64, "frame advanced");
        self.index == 0
    }

    /// Turning auto-play on while stopped advances one frame right away.
    /// Returns true if that advancement wrapped.
    pub(crate) fn set_auto_play(&mut self, on: bool, now: Instant) -> bool {
        self.auto_play = on;
        if self.durations.is_empty() {
            return false;
        }
        match (on, self.state) {
            (false, PlaybackState::Playing) => {
                self.halt(PlaybackState::Stopped);
                false
            }
            (true, PlaybackState::Stopped) => {
                self.state = PlaybackState::Playing;
                self.index = (self.index + 1) % self.durations.len();
                self.schedule(now, Duration::ZERO);
                self.index == 0
            }
            _ => false,
        }
    }

    pub(crate) fn begin_scrub(&mut self) {
        if !self.durations.is_empty() {
            self.halt(PlaybackState::ManuallyScrubbing);
        }
    }

    pub(crate) fn scrub_to(&mut self, index: usize) {
        if self.state == PlaybackState::ManuallyScrubbing {
            self.index = index.min(self.durations.len() - 1);
        }
    }

    pub(crate) fn end_scrub(&mut self, now: Instant) {
        if self.state != PlaybackState::ManuallyScrubbing {
            return;
        }
        if self.auto_play {
            self.state = PlaybackState::Playing;
            self.schedule(now, Duration::ZERO);
        } else {
            self.halt(PlaybackState::Stopped);
        }
    }

    /// Manual frame stepping, only while stopped. Wraps in both directions.
    pub(crate) fn step(&mut self, delta: isize) {
        if self.state != PlaybackState::Stopped || self.durations.is_empty() {
            return;
        }
        let len = self.durations.len() as isize;
        self.index = (self.index as isize + delta).rem_euclid(len) as usize;
    }

    pub(crate) fn set_durations(&mut self, durations: Vec<Duration>, now: Instant) {
        let resized = durations.len() != self.durations.len();
        self.durations = durations;

        if self.durations.is_empty() {
            self.index = 0;
            self.halt(PlaybackState::Stopped);
            return;
        }
        if resized {
            self.index = 0;
        }
        if self.state == PlaybackState::Playing {
            self.schedule(now, Duration::ZERO);
        }
    }
}

/// Drives frame advancement for one displayed animation on its own task.
///
/// The current frame index is published through a watch channel. Dropping
/// the scheduler cancels the task.
pub struct PlaybackScheduler {
    control: mpsc::UnboundedSender<Control>,
    frame: watch::Receiver<usize>,
    state: watch::Receiver<PlaybackState>,
    cancel: CancellationToken,
}

impl PlaybackScheduler {
    /// Starts the clock. With `auto_play` the first frame is shown for its
    /// duration and playback begins immediately.
    pub fn start(
        durations: Vec<Duration>,
        auto_play: bool,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let mut playback = Playback::new(durations, auto_play);
        if auto_play {
            playback.play(Instant::now());
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = watch::channel(playback.index());
        let (state_tx, state_rx) = watch::channel(playback.state());
        let cancel = CancellationToken::new();

        tokio::spawn(drive(
            playback,
            control_rx,
            frame_tx,
            state_tx,
            events_tx,
            cancel.clone(),
        ));

        let scheduler = Self {
            control: control_tx,
            frame: frame_rx,
            state: state_rx,
            cancel,
        };
        (scheduler, events_rx)
    }

    pub fn frame_index(&self) -> usize {
        *self.frame.borrow()
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// A receiver that observes every frame change.
    pub fn frame_binding(&self) -> watch::Receiver<usize> {
        self.frame.clone()
    }

    pub fn play(&self) {
        self.send(Control::Play);
    }

    pub fn set_auto_play(&self, on: bool) {
        self.send(Control::SetAutoPlay(on));
    }

    pub fn begin_scrub(&self) {
        self.send(Control::BeginScrub);
    }

    pub fn scrub_to(&self, index: usize) {
        self.send(Control::ScrubTo(index));
    }

    pub fn end_scrub(&self) {
        self.send(Control::EndScrub);
    }

    pub fn step(&self, delta: isize) {
        self.send(Control::Step(delta));
    }

    pub fn set_durations(&self, durations: Vec<Duration>) {
        self.send(Control::SetDurations(durations));
    }

    fn send(&self, control: Control) {
        if self.control.send(control).is_err() {
            debug!("playback task already stopped");
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    mut playback: Playback,
    mut control: mpsc::UnboundedReceiver<Control>,
    frame: watch::Sender<usize>,
    state: watch::Sender<PlaybackState>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    cancel: CancellationToken,
) {
    loop {
        let due = playback.due();
        let mut wrapped = false;

        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = control.recv() => {
                let Some(msg) = msg else { break };
                let now = Instant::now();
                match msg {
                    Control::Play => playback.play(now),
                    Control::SetAutoPlay(on) => wrapped = playback.set_auto_play(on, now),
                    Control::BeginScrub => playback.begin_scrub(),
                    Control::ScrubTo(index) => playback.scrub_to(index),
                    Control::EndScrub => playback.end_scrub(now),
                    Control::Step(delta) => playback.step(delta),
                    Control::SetDurations(durations) => playback.set_durations(durations, now),
                }
            }
            _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                wrapped = playback.tick(Instant::now());
            }
        }

        let index = playback.index();
        frame.send_if_modified(|current| {
            let changed = *current != index;
            *current = index;
            changed
        });
        let next_state = playback.state();
        state.send_if_modified(|current| {
            let changed = *current != next_state;
            *current = next_state;
            changed
        });
        if wrapped {
            let _ = events.send(PlaybackEvent::LoopCompleted);
        }
    }
    debug!("playback task finished");
}
