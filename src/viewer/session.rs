use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::animation::{
    self, AnimationFrame, AnimationKind, DecodedAnimation, PlaybackEvent, PlaybackScheduler,
    PlaybackState,
};
use crate::config::Config;
use crate::error::{AppError, DecodeError, Result};
use crate::library::{ContentSource, LibraryLayout};
use crate::models::ViewedEvent;
use crate::pointer::{ContentPointer, Snapshot};

use super::Slideshow;

#[derive(Debug, Clone, Copy)]
pub struct ViewerSettings {
    pub auto_play: bool,
    pub slideshow_interval: Duration,
    pub slideshow_waits_for_animation: bool,
}

impl ViewerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_play: true,
            slideshow_interval: Duration::from_secs(config.slideshow_interval_secs.max(1)),
            slideshow_waits_for_animation: config.slideshow_waits_for_animation,
        }
    }
}

/// What the viewer currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Display {
    /// The current post has no attachments.
    Empty,
    Loading(PathBuf),
    Still {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    Animated {
        path: PathBuf,
        frames: usize,
        width: u32,
        height: u32,
    },
    Failed {
        path: PathBuf,
        reason: String,
    },
}

impl Display {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Display::Empty => None,
            Display::Loading(path)
            | Display::Still { path, .. }
            | Display::Animated { path, .. }
            | Display::Failed { path, .. } => Some(path),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Display::Loading(_))
    }
}

enum Decoded {
    Still { width: u32, height: u32 },
    Animated(DecodedAnimation),
}

// Tagged with the generation that requested it
struct DecodeResult {
    generation: u64,
    result: std::result::Result<Decoded, String>,
}

struct Playback {
    animation: DecodedAnimation,
    scheduler: PlaybackScheduler,
    events: mpsc::UnboundedReceiver<PlaybackEvent>,
}

/// One open viewer: a content pointer plus the decode, playback and
/// slideshow state of whatever it points at.
pub struct ViewerSession<S: ContentSource> {
    pointer: ContentPointer<S>,
    viewed: mpsc::UnboundedReceiver<ViewedEvent>,
    settings: ViewerSettings,

    display: Display,
    generation: u64,
    decode_tx: mpsc::Sender<DecodeResult>,
    decode_rx: mpsc::Receiver<DecodeResult>,

    playback: Option<Playback>,
    auto_play: bool,
    scrubbing: bool,
    slideshow: Option<Slideshow>,
}

impl<S: ContentSource> ViewerSession<S> {
    pub async fn open(
        source: Arc<S>,
        layout: LibraryLayout,
        snapshot: Snapshot,
        settings: ViewerSettings,
    ) -> Result<Self> {
        let (pointer, viewed) = ContentPointer::load(source, layout, snapshot).await?;
        let (decode_tx, decode_rx) = mpsc::channel(4);

        let mut session = Self {
            pointer,
            viewed,
            settings,
            display: Display::Empty,
            generation: 0,
            decode_tx,
            decode_rx,
            playback: None,
            auto_play: settings.auto_play,
            scrubbing: false,
            slideshow: None,
        };
        session.show_current();
        info!(
            artist = %session.pointer.current_artist().display_name,
            position = ?session.pointer.position(),
            "viewer opened"
        );
        Ok(session)
    }

    pub fn pointer(&self) -> &ContentPointer<S> {
        &self.pointer
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn auto_play(&self) -> bool {
        self.auto_play
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    pub fn slideshow_active(&self) -> bool {
        self.slideshow.is_some()
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.playback.as_ref().map(|p| p.scheduler.state())
    }

    pub fn frame_index(&self) -> Option<usize> {
        self.playback.as_ref().map(|p| p.scheduler.frame_index())
    }

    pub fn frame_count(&self) -> Option<usize> {
        self.playback.as_ref().map(|p| p.animation.len())
    }

    pub fn current_frame(&self) -> Option<&AnimationFrame> {
        let playback = self.playback.as_ref()?;
        playback
            .animation
            .frames()
            .get(playback.scheduler.frame_index())
    }

    /// Returns whether the post changed.
    pub async fn next_image(&mut self) -> bool {
        let before = self.pointer.position();
        let post_changed = self.pointer.next_image().await;
        if self.pointer.position() != before {
            self.show_current();
        }
        post_changed
    }

    pub async fn previous_image(&mut self) -> bool {
        let before = self.pointer.position();
        let post_changed = self.pointer.previous_image().await;
        if self.pointer.position() != before {
            self.show_current();
        }
        post_changed
    }

    pub fn toggle_auto_play(&mut self) {
        self.auto_play = !self.auto_play;
        if let Some(playback) = &self.playback {
            playback.scheduler.set_auto_play(self.auto_play);
        }
    }

    /// Steps one frame, or moves the scrub position while scrubbing.
    pub fn step_frame(&mut self, delta: isize) {
        let Some(playback) = &self.playback else {
            return;
        };
        if self.scrubbing {
            let len = playback.animation.len() as isize;
            let target = (playback.scheduler.frame_index() as isize + delta).rem_euclid(len);
            playback.scheduler.scrub_to(target as usize);
        } else {
            playback.scheduler.step(delta);
        }
    }

    pub fn toggle_scrub(&mut self) {
        let Some(playback) = &self.playback else {
            return;
        };
        if self.scrubbing {
            playback.scheduler.end_scrub();
        } else {
            playback.scheduler.begin_scrub();
        }
        self.scrubbing = !self.scrubbing;
    }

    pub fn toggle_slideshow(&mut self) {
        if self.slideshow.take().is_some() {
            if let Some(playback) = &self.playback {
                playback.scheduler.set_auto_play(self.auto_play);
            }
            info!("slideshow stopped");
            return;
        }

        self.slideshow = Some(Slideshow::new(
            self.settings.slideshow_interval,
            self.settings.slideshow_waits_for_animation,
            Instant::now(),
        ));
        // A paused animation would never finish its loop.
        if let Some(playback) = &self.playback {
            playback.scheduler.set_auto_play(true);
        }
        info!(interval_secs = self.settings.slideshow_interval.as_secs(), "slideshow started");
    }

    /// Opens the current attachment, or the post folder for an empty post,
    /// in the system viewer.
    pub fn open_external(&self) -> Result<()> {
        let target = self
            .pointer
            .current_file()
            .or_else(|| self.pointer.current_post_dir())
            .ok_or(AppError::NoContent)?;
        open::that(&target)?;
        Ok(())
    }

    /// Applies finished decodes and playback events, drives the slideshow,
    /// and returns viewed notifications recorded since the last call.
    pub async fn poll(&mut self) -> Vec<ViewedEvent> {
        while let Ok(result) = self.decode_rx.try_recv() {
            self.apply_decode(result);
        }

        let mut loop_completed = false;
        if let Some(playback) = &mut self.playback {
            while let Ok(PlaybackEvent::LoopCompleted) = playback.events.try_recv() {
                loop_completed = true;
            }
        }
        if loop_completed {
            if let Some(show) = &mut self.slideshow {
                show.on_loop_completed();
            }
        }

        self.advance_slideshow().await;

        let mut events = Vec::new();
        while let Ok(event) = self.viewed.try_recv() {
            events.push(event);
        }
        events
    }

    async fn advance_slideshow(&mut self) {
        let Some(show) = &self.slideshow else {
            return;
        };
        if self.display.is_loading()
            || !show.should_advance(Instant::now(), self.playback.is_some())
        {
            return;
        }

        if self.pointer.is_last_post() {
            info!("slideshow reached the end");
            self.toggle_slideshow();
            return;
        }
        let before = self.pointer.position();
        self.next_image().await;
        if self.pointer.position() == before {
            info!("slideshow found nothing further");
            self.toggle_slideshow();
        }
    }

    fn show_current(&mut self) {
        self.generation += 1;
        self.playback = None;
        self.scrubbing = false;
        if let Some(show) = &mut self.slideshow {
            show.restart(Instant::now());
        }

        let Some(path) = self.pointer.current_file() else {
            self.display = Display::Empty;
            return;
        };
        self.display = Display::Loading(path.clone());

        let generation = self.generation;
        let tx = self.decode_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || decode_attachment(&path)).await
            {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("decode task failed: {e}")),
            };
            let _ = tx.send(DecodeResult { generation, result }).await;
        });
    }

    fn apply_decode(&mut self, result: DecodeResult) {
        // Only apply if this is the attachment still on screen
        if result.generation != self.generation {
            debug!(generation = result.generation, "discarding stale decode");
            return;
        }
        let Display::Loading(path) = &self.display else {
            return;
        };
        let path = path.clone();

        self.display = match result.result {
            Ok(Decoded::Still { width, height }) => Display::Still {
                path,
                width,
                height,
            },
            Ok(Decoded::Animated(animation)) => {
                let (width, height) = animation
                    .frames()
                    .first()
                    .map(|f| f.image.dimensions())
                    .unwrap_or_default();
                let frames = animation.len();
                let auto_play = self.auto_play || self.slideshow.is_some();
                let (scheduler, events) = PlaybackScheduler::start(animation.durations(), auto_play);
                self.playback = Some(Playback {
                    animation,
                    scheduler,
                    events,
                });
                Display::Animated {
                    path,
                    frames,
                    width,
                    height,
                }
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, kind = "decode_error", "cannot display attachment");
                Display::Failed { path, reason }
            }
        };

        if let Some(show) = &mut self.slideshow {
            show.restart(Instant::now());
        }
    }
}

fn decode_attachment(path: &Path) -> Result<Decoded> {
    if AnimationKind::from_path(path).is_some() {
        let animation = match animation::decode_file(path) {
            Ok(animation) => animation,
            // A plain image archive: show its first picture
            Err(DecodeError::MissingManifest) => return archive_cover(path),
            Err(e) => return Err(e.into()),
        };
        if animation.len() > 1 {
            return Ok(Decoded::Animated(animation));
        }
        let (width, height) = animation
            .frames()
            .first()
            .map(|f| f.image.dimensions())
            .unwrap_or_default();
        return Ok(Decoded::Still { width, height });
    }

    let (width, height) = image::image_dimensions(path)
        .map_err(|e| DecodeError::CannotOpenContainer(e.to_string()))?;
    Ok(Decoded::Still { width, height })
}

fn archive_cover(path: &Path) -> Result<Decoded> {
    let bytes = animation::first_frame_only(path).ok_or(DecodeError::MissingManifest)?;
    let cover = image::load_from_memory(&bytes)
        .map_err(|e| DecodeError::CannotOpenContainer(e.to_string()))?;
    debug!(path = %path.display(), "archive without manifest, showing first image");
    Ok(Decoded::Still {
        width: cover.width(),
        height: cover.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::tests::MemorySource;
    use crate::pointer::Slot;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};
    use std::fs::File;

    fn settings(slideshow_ms: u64) -> ViewerSettings {
        ViewerSettings {
            auto_play: true,
            slideshow_interval: Duration::from_millis(slideshow_ms),
            slideshow_waits_for_animation: true,
        }
    }

    fn write_png(root: &Path, artist: i64, post: i64, name: &str, w: u32, h: u32) {
        let dir = root.join(format!("artist-{artist}")).join(format!("post-{post}"));
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    fn write_gif(root: &Path, artist: i64, post: i64, name: &str, frames: usize) {
        let dir = root.join(format!("artist-{artist}")).join(format!("post-{post}"));
        std::fs::create_dir_all(&dir).unwrap();
        let mut encoder = GifEncoder::new(File::create(dir.join(name)).unwrap());
        encoder
            .encode_frames((0..frames).map(|i| {
                let img = RgbaImage::from_pixel(4, 4, Rgba([(i * 50) as u8, 0, 0, 255]));
                Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(30, 1))
            }))
            .unwrap();
    }

    async fn open(
        source: MemorySource,
        snapshot: Snapshot,
        root: &Path,
        settings: ViewerSettings,
    ) -> ViewerSession<MemorySource> {
        ViewerSession::open(Arc::new(source), LibraryLayout::new(root), snapshot, settings)
            .await
            .unwrap()
    }

    async fn settle(session: &mut ViewerSession<MemorySource>) -> Vec<ViewedEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(session.poll().await);
            if !session.display().is_loading() {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("decode never finished");
    }

    #[tokio::test]
    async fn shows_stills_failures_and_empty_posts() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), 1, 101, "1.png", 3, 2);

        let source = MemorySource::with_layout(&[&[2, 0]]);
        let snapshot = source.snapshot();
        let mut session = open(source, snapshot, dir.path(), settings(1_000)).await;

        let events = settle(&mut session).await;
        assert!(matches!(
            session.display(),
            Display::Still { width: 3, height: 2, .. }
        ));
        assert!(events.iter().all(|e| e.post_id == 101));

        assert!(!session.next_image().await);
        settle(&mut session).await;
        assert!(matches!(session.display(), Display::Failed { .. }));

        assert!(session.next_image().await);
        assert_eq!(session.display(), &Display::Empty);
        assert_eq!(session.pointer().position().slot, Slot::Empty);
    }

    #[tokio::test]
    async fn stale_decode_never_replaces_current_image() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), 1, 101, "1.png", 8, 8);
        write_png(dir.path(), 1, 101, "2.png", 5, 7);

        let source = MemorySource::with_layout(&[&[2]]);
        let snapshot = source.snapshot();
        let mut session = open(source, snapshot, dir.path(), settings(1_000)).await;

        // Move on before the first decode is applied.
        session.next_image().await;
        settle(&mut session).await;
        // Give the first decode time to land as well.
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.poll().await;

        match session.display() {
            Display::Still {
                path,
                width,
                height,
            } => {
                assert!(path.ends_with("2.png"));
                assert_eq!((*width, *height), (5, 7));
            }
            other => panic!("unexpected display {other:?}"),
        }
    }

    #[tokio::test]
    async fn animated_attachment_starts_playback() {
        let dir = tempfile::tempdir().unwrap();
        write_gif(dir.path(), 1, 101, "1.gif", 3);

        let source = MemorySource::with_layout(&[&[1]]);
        let mut snapshot = source.snapshot();
        snapshot.attachments = Some(vec!["1.gif".to_string()]);
        let mut session = open(source, snapshot, dir.path(), settings(1_000)).await;

        settle(&mut session).await;
        assert!(matches!(
            session.display(),
            Display::Animated { frames: 3, width: 4, height: 4, .. }
        ));
        assert_eq!(session.frame_count(), Some(3));
        assert_eq!(session.playback_state(), Some(PlaybackState::Playing));
        assert!(session.current_frame().is_some());

        session.toggle_auto_play();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.playback_state(), Some(PlaybackState::Stopped));

        session.toggle_scrub();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.playback_state(), Some(PlaybackState::ManuallyScrubbing));
        assert!(session.is_scrubbing());
    }

    #[tokio::test]
    async fn archive_without_manifest_shows_first_image() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = tempfile::tempdir().unwrap();
        let post_dir = dir.path().join("artist-1").join("post-101");
        std::fs::create_dir_all(&post_dir).unwrap();
        let mut png = Vec::new();
        RgbaImage::from_pixel(6, 3, Rgba([0, 0, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let mut writer = zip::ZipWriter::new(File::create(post_dir.join("1.zip")).unwrap());
        writer.start_file("a.png", SimpleFileOptions::default()).unwrap();
        writer.write_all(&png).unwrap();
        writer.finish().unwrap();

        let source = MemorySource::with_layout(&[&[1]]);
        let mut snapshot = source.snapshot();
        snapshot.attachments = Some(vec!["1.zip".to_string()]);
        let mut session = open(source, snapshot, dir.path(), settings(1_000)).await;

        settle(&mut session).await;
        assert!(matches!(
            session.display(),
            Display::Still { width: 6, height: 3, .. }
        ));
        assert_eq!(session.frame_count(), None);
    }

    #[tokio::test]
    async fn slideshow_runs_to_the_end_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), 1, 101, "1.png", 2, 2);
        write_png(dir.path(), 2, 102, "1.png", 2, 2);

        let source = MemorySource::with_layout(&[&[1], &[1]]);
        let snapshot = source.snapshot();
        let mut session = open(source, snapshot, dir.path(), settings(30)).await;

        session.toggle_slideshow();
        assert!(session.slideshow_active());

        let mut seen = Vec::new();
        for _ in 0..200 {
            seen.extend(session.poll().await.into_iter().map(|e| e.post_id));
            if !session.slideshow_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!session.slideshow_active());
        assert!(session.pointer().is_last_post());
        assert_eq!(session.pointer().position().artist, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        seen.extend(session.poll().await.into_iter().map(|e| e.post_id));
        assert!(seen.contains(&101));
        assert!(seen.contains(&102));
    }

    #[tokio::test]
    async fn slideshow_stops_before_a_trailing_artist_without_posts() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), 1, 101, "1.png", 2, 2);

        let source = Arc::new(MemorySource::with_layout(&[&[1], &[]]));
        let snapshot = source.snapshot();
        let mut session = ViewerSession::open(
            Arc::clone(&source),
            LibraryLayout::new(dir.path()),
            snapshot,
            settings(20),
        )
        .await
        .unwrap();
        settle(&mut session).await;

        session.toggle_slideshow();
        for _ in 0..50 {
            session.poll().await;
            if !session.slideshow_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!session.slideshow_active());
        assert_eq!(session.pointer().position().artist, 0);
        let fetches = source.post_fetches.lock().unwrap().len();
        assert!(fetches <= 1, "artist 2 paged in {fetches} times");
    }

    #[tokio::test]
    async fn open_rejects_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::with_layout(&[&[]]);
        let snapshot = source.snapshot();
        let result = ViewerSession::open(
            Arc::new(source),
            LibraryLayout::new(dir.path()),
            snapshot,
            settings(1_000),
        )
        .await;
        assert!(matches!(result, Err(AppError::NoContent)));
    }
}
