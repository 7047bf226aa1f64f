use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{Config, ViewConfig};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::library::{import_root, ContentSource, ImportSummary, Library, LibraryLayout};
use crate::models::{Artist, Platform, Post, ViewedEvent};
use crate::pointer::Snapshot;
use crate::remote::{RemoteClient, RemoteDetails};
use crate::tui::AppAction;
use crate::viewer::{ViewerSession, ViewerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Artists,
    Posts,
    Viewer,
}

// Message for a completed comments/tags fetch
pub struct DetailsResult {
    pub post_id: i64,
    pub result: std::result::Result<RemoteDetails, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsStatus {
    Idle,
    Loading,
    Loaded(RemoteDetails),
    Failed(String),
}

pub struct App {
    // Data
    pub artists: Vec<Artist>,
    pub posts: Vec<Post>,

    // UI State
    pub screen: Screen,
    pub platform: Platform,
    pub artist_index: usize,
    pub post_index: usize,
    pub view: ViewConfig,
    pub show_help: bool,
    pub status_message: Option<String>,

    // Viewer
    pub viewer: Option<ViewerSession<Library>>,
    pub details_status: DetailsStatus,
    pub pending_details_post_id: Option<i64>,
    details_rx: mpsc::Receiver<DetailsResult>,
    details_tx: mpsc::Sender<DetailsResult>,

    // Services
    config: Config,
    config_path: PathBuf,
    repository: Option<Repository>,
    pub store_error: Option<String>,
    remote: Option<RemoteClient>,
}

impl App {
    /// Never fails on a broken database: the app starts with an empty,
    /// read-only library and shows why.
    pub async fn new(config: Config) -> Result<Self> {
        let (repository, store_error) = match Repository::new(&config.db_path).await {
            Ok(repo) => (Some(repo), None),
            Err(e) => {
                let error = AppError::StoreUnavailable(e.to_string());
                warn!(error = %error, db = %config.db_path, "cannot open library database");
                (None, Some(error.to_string()))
            }
        };

        let remote = match RemoteClient::new(&config) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "remote lookups disabled");
                None
            }
        };

        let (details_tx, details_rx) = mpsc::channel(1);
        let platform = Platform::ALL
            .into_iter()
            .find(|p| config.root_for(*p).is_some())
            .unwrap_or(Platform::Kemono);

        let mut app = Self {
            artists: Vec::new(),
            posts: Vec::new(),
            screen: Screen::Artists,
            platform,
            artist_index: 0,
            post_index: 0,
            view: config.view,
            show_help: false,
            status_message: None,
            viewer: None,
            details_status: DetailsStatus::Idle,
            pending_details_post_id: None,
            details_rx,
            details_tx,
            config,
            config_path: Config::config_path(),
            repository,
            store_error,
            remote,
        };
        app.reload_artists().await;
        Ok(app)
    }

    pub fn library(&self) -> Library {
        match &self.repository {
            Some(repo) => Library::new(repo.clone(), self.platform, self.view.post_query()),
            None => Library::unavailable(self.platform, self.view.post_query()),
        }
    }

    pub fn selected_artist(&self) -> Option<&Artist> {
        self.artists.get(self.artist_index)
    }

    pub fn selected_post(&self) -> Option<&Post> {
        self.posts.get(self.post_index)
    }

    /// The post under the cursor and its viewed flag: the viewer's post when
    /// one is open, which was marked viewed on entry.
    fn focused_post(&self) -> Option<(i64, bool)> {
        match &self.viewer {
            Some(viewer) => {
                let id = viewer.pointer().current_post()?.id;
                let viewed = self
                    .posts
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| p.viewed)
                    .unwrap_or(true);
                Some((id, viewed))
            }
            None => self.selected_post().map(|p| (p.id, p.viewed)),
        }
    }

    /// The artist under the cursor. In the viewer this is the list's copy,
    /// which tracks viewed events; the pointer's copy is a load-time snapshot.
    fn focused_artist(&self) -> Option<&Artist> {
        match &self.viewer {
            Some(viewer) => {
                let current = viewer.pointer().current_artist();
                self.artists
                    .iter()
                    .find(|a| a.id == current.id)
                    .or(Some(current))
            }
            None => self.selected_artist(),
        }
    }

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        self.status_message = None;

        match action {
            AppAction::Quit => return Ok(true),

            AppAction::MoveUp => match self.screen {
                Screen::Artists if self.artist_index > 0 => {
                    self.artist_index -= 1;
                }
                Screen::Posts if self.post_index > 0 => {
                    self.post_index -= 1;
                }
                _ => {}
            },

            AppAction::MoveDown => match self.screen {
                Screen::Artists if self.artist_index + 1 < self.artists.len() => {
                    self.artist_index += 1;
                }
                Screen::Posts if self.post_index + 1 < self.posts.len() => {
                    self.post_index += 1;
                }
                _ => {}
            },

            AppAction::Select => match self.screen {
                Screen::Artists => {
                    if self.selected_artist().is_some() {
                        self.post_index = 0;
                        self.reload_posts().await;
                        self.screen = Screen::Posts;
                    }
                }
                Screen::Posts => self.open_viewer().await,
                Screen::Viewer => {}
            },

            AppAction::Back => match self.screen {
                Screen::Viewer => self.close_viewer(),
                Screen::Posts => {
                    self.screen = Screen::Artists;
                    self.posts.clear();
                }
                Screen::Artists => {}
            },

            AppAction::NextImage => {
                if let Some(viewer) = &mut self.viewer {
                    if viewer.next_image().await {
                        self.reset_details();
                    }
                }
            }

            AppAction::PreviousImage => {
                if let Some(viewer) = &mut self.viewer {
                    if viewer.previous_image().await {
                        self.reset_details();
                    }
                }
            }

            AppAction::ToggleAutoPlay => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.toggle_auto_play();
                }
            }

            AppAction::StepFrame(delta) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.step_frame(delta);
                }
            }

            AppAction::ToggleScrub => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.toggle_scrub();
                }
            }

            AppAction::ToggleSlideshow => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.toggle_slideshow();
                }
            }

            AppAction::TogglePostViewed => self.toggle_post_viewed().await,

            AppAction::ToggleArtistViewed => self.toggle_artist_viewed().await,

            AppAction::ToggleUnviewedFilter => {
                self.view.only_unviewed = !self.view.only_unviewed;
                self.on_view_changed().await;
            }

            AppAction::CycleSortKey => {
                self.view.sort_key = self.view.sort_key.cycle();
                self.on_view_changed().await;
            }

            AppAction::ToggleSortOrder => {
                self.view.sort_order = self.view.sort_order.cycle();
                self.on_view_changed().await;
            }

            AppAction::CyclePlatform => {
                self.close_viewer();
                self.platform = self.platform.cycle();
                self.screen = Screen::Artists;
                self.artist_index = 0;
                self.posts.clear();
                self.reload_artists().await;
            }

            AppAction::FetchDetails => self.fetch_details(),

            AppAction::OpenExternal => self.open_external(),

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }
        }

        Ok(false)
    }

    async fn open_viewer(&mut self) {
        let Some(root) = self.config.root_for(self.platform).cloned() else {
            self.status_message = Some(format!("No {} folder configured", self.platform.label()));
            return;
        };
        if self.posts.is_empty() {
            return;
        }

        let snapshot = Snapshot {
            artists: self.artists.clone(),
            artist_index: self.artist_index,
            posts: self.posts.clone(),
            post_index: self.post_index,
            attachments: None,
            attachment_index: 0,
        };

        match ViewerSession::open(
            Arc::new(self.library()),
            LibraryLayout::new(root),
            snapshot,
            ViewerSettings::from_config(&self.config),
        )
        .await
        {
            Ok(viewer) => {
                self.viewer = Some(viewer);
                self.screen = Screen::Viewer;
                self.reset_details();
            }
            Err(e) => {
                warn!(error = %e, "cannot open viewer");
                self.status_message = Some(e.to_string());
            }
        }
    }

    fn close_viewer(&mut self) {
        let Some(viewer) = self.viewer.take() else {
            return;
        };

        // Return to the list at the place the viewer ended
        let position = viewer.pointer().position();
        if position.artist != self.artist_index {
            self.artist_index = position.artist;
            self.posts = viewer.pointer().current_posts().to_vec();
        }
        self.post_index = position.post;
        self.screen = Screen::Posts;
        self.reset_details();
    }

    /// Drains the viewer's decode, playback and viewed updates (non-blocking)
    pub async fn poll_viewer(&mut self) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        let events = viewer.poll().await;
        for event in events {
            self.apply_viewed_event(event);
        }
    }

    /// Poll for a completed comments/tags fetch (non-blocking)
    pub fn poll_details_result(&mut self) {
        if let Ok(result) = self.details_rx.try_recv() {
            // Only apply if this is still the post on screen
            if self.pending_details_post_id == Some(result.post_id) {
                self.details_status = match result.result {
                    Ok(details) => DetailsStatus::Loaded(details),
                    Err(e) => DetailsStatus::Failed(e),
                };
                self.pending_details_post_id = None;
            }
        }
    }

    // Keep rows visible even when a filter would now hide them;
    // they drop out on the next reload.
    fn apply_viewed_event(&mut self, event: ViewedEvent) {
        if let Some(post) = self.posts.iter_mut().find(|p| p.id == event.post_id) {
            post.viewed = true;
        }
        if event.artist_flag_changed {
            if let Some(artist) = self.artists.iter_mut().find(|a| a.id == event.artist_id) {
                artist.has_unviewed = event.artist_has_unviewed;
            }
        }
    }

    async fn toggle_post_viewed(&mut self) {
        let Some((post_id, viewed)) = self.focused_post() else {
            return;
        };

        match self.library().set_post_viewed(post_id, !viewed).await {
            Ok(change) => {
                if let Some(post) = self.posts.iter_mut().find(|p| p.id == post_id) {
                    post.viewed = !viewed;
                }
                if let Some(artist) = self.artists.iter_mut().find(|a| a.id == change.artist_id) {
                    artist.has_unviewed = change.artist_has_unviewed;
                }
            }
            Err(e) => self.report(e),
        }
    }

    async fn toggle_artist_viewed(&mut self) {
        let Some(artist) = self.focused_artist() else {
            return;
        };
        let artist_id = artist.id;
        let viewed = artist.has_unviewed;

        if let Err(e) = self
            .library()
            .set_artist_all_posts_viewed(artist_id, viewed)
            .await
        {
            self.report(e);
            return;
        }

        let has_unviewed = match &self.repository {
            Some(repo) => match repo.get_artist(artist_id).await {
                Ok(Some(artist)) => artist.has_unviewed,
                _ => !viewed,
            },
            None => !viewed,
        };
        if let Some(artist) = self.artists.iter_mut().find(|a| a.id == artist_id) {
            artist.has_unviewed = has_unviewed;
        }
        for post in self.posts.iter_mut().filter(|p| p.artist_id == artist_id) {
            post.viewed = viewed;
        }
    }

    async fn on_view_changed(&mut self) {
        self.config.view = self.view;
        if let Err(e) = self.config.save_to(&self.config_path) {
            warn!(error = %e, "failed to save view settings");
        }

        if self.screen == Screen::Viewer {
            return;
        }
        self.reload_artists().await;
        if self.screen == Screen::Posts {
            self.reload_posts().await;
        }
    }

    fn fetch_details(&mut self) {
        let Some(remote) = self.remote.clone() else {
            self.details_status = DetailsStatus::Failed("remote lookups disabled".to_string());
            return;
        };
        let Some(viewer) = &self.viewer else {
            return;
        };
        let artist = viewer.pointer().current_artist().clone();
        let Some(post) = viewer.pointer().current_post().cloned() else {
            return;
        };

        self.details_status = DetailsStatus::Loading;
        self.pending_details_post_id = Some(post.id);

        let tx = self.details_tx.clone();
        tokio::spawn(async move {
            let result = remote
                .fetch_details(&artist, &post)
                .await
                .map_err(|e| e.to_string());
            let _ = tx
                .send(DetailsResult {
                    post_id: post.id,
                    result,
                })
                .await;
        });
    }

    fn reset_details(&mut self) {
        self.details_status = DetailsStatus::Idle;
        self.pending_details_post_id = None;
    }

    fn open_external(&mut self) {
        let result = match &self.viewer {
            Some(viewer) => viewer.open_external(),
            None => self.open_selected_post_dir(),
        };
        if let Err(e) = result {
            self.report(e);
        }
    }

    fn open_selected_post_dir(&self) -> Result<()> {
        let root = self
            .config
            .root_for(self.platform)
            .ok_or_else(|| AppError::Config(format!("no {} folder configured", self.platform.as_str())))?;
        let (Some(artist), Some(post)) = (self.selected_artist(), self.selected_post()) else {
            return Err(AppError::NoContent);
        };
        let dir = LibraryLayout::new(root).post_dir(&artist.folder_name, &post.folder_name);
        open::that(dir)?;
        Ok(())
    }

    async fn reload_artists(&mut self) {
        match self.library().list_artists().await {
            Ok(artists) => self.artists = artists,
            Err(e) => {
                self.report(e);
                self.artists.clear();
            }
        }
        if self.artist_index >= self.artists.len() {
            self.artist_index = self.artists.len().saturating_sub(1);
        }
    }

    async fn reload_posts(&mut self) {
        let Some(artist_id) = self.selected_artist().map(|a| a.id) else {
            self.posts.clear();
            return;
        };
        match self.library().list_posts(artist_id).await {
            Ok(posts) => self.posts = posts,
            Err(e) => {
                self.report(e);
                self.posts.clear();
            }
        }
        if self.post_index >= self.posts.len() {
            self.post_index = self.posts.len().saturating_sub(1);
        }
    }

    fn report(&mut self, error: AppError) {
        match &error {
            AppError::StoreUnavailable(_) => {
                warn!(error = %error, kind = "store_unavailable", "change not saved");
            }
            _ => tracing::error!(error = %error, "action failed"),
        }
        self.status_message = Some(error.to_string());
    }

    /// Scans every configured platform folder into the database.
    pub async fn import_library(&mut self) -> Result<Vec<(Platform, ImportSummary)>> {
        let Some(repo) = self.repository.clone() else {
            return Err(AppError::StoreUnavailable(
                self.store_error.clone().unwrap_or_default(),
            ));
        };

        let mut summaries = Vec::new();
        for platform in Platform::ALL {
            let Some(root) = self.config.root_for(platform).cloned() else {
                continue;
            };
            let summary = import_root(&repo, &root, platform).await?;
            summaries.push((platform, summary));
        }

        self.reload_artists().await;
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::path::Path;
    use std::time::Duration;

    fn write_post(root: &Path, artist: &str, post: &str, files: &[&str]) {
        let dir = root.join(artist).join(post);
        std::fs::create_dir_all(&dir).unwrap();
        for name in files {
            RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    fn config(dir: &Path) -> Config {
        Config {
            db_path: dir.join("library.db").to_string_lossy().to_string(),
            pixiv_root: Some(dir.join("pixiv")),
            ..Config::default()
        }
    }

    async fn scanned_app(dir: &Path) -> App {
        let root = dir.join("pixiv");
        write_post(&root, "alice", "100", &["1.png", "2.png"]);
        write_post(&root, "alice", "101", &[]);
        write_post(&root, "bob", "200", &["1.png"]);

        let mut app = App::new(config(dir)).await.unwrap();
        app.config_path = dir.join("config.toml");
        let summaries = app.import_library().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].0, Platform::Pixiv);
        assert_eq!(summaries[0].1.posts, 3);
        app
    }

    async fn poll_until(app: &mut App, done: impl Fn(&App) -> bool) {
        for _ in 0..200 {
            app.poll_viewer().await;
            if done(app) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never reached");
    }

    #[tokio::test]
    async fn broken_database_starts_with_banner() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("missing").join("deeper").join("x.db").to_string_lossy().to_string(),
            ..Config::default()
        };

        let mut app = App::new(config).await.unwrap();
        assert!(app.store_error.is_some());
        assert!(app.artists.is_empty());
        assert!(matches!(
            app.import_library().await,
            Err(AppError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn browsing_and_viewing_marks_posts() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = scanned_app(dir.path()).await;
        assert_eq!(app.platform, Platform::Pixiv);
        assert_eq!(app.artists.len(), 2);
        assert!(app.artists.iter().all(|a| a.has_unviewed));

        app.handle_action(AppAction::Select).await.unwrap();
        assert_eq!(app.screen, Screen::Posts);
        let first_artist = app.artists[0].id;
        assert!(app.posts.iter().all(|p| p.artist_id == first_artist));

        app.handle_action(AppAction::Select).await.unwrap();
        assert_eq!(app.screen, Screen::Viewer);
        let opened = app.posts[0].id;
        poll_until(&mut app, |app| app.posts.iter().any(|p| p.id == opened && p.viewed)).await;

        app.handle_action(AppAction::Back).await.unwrap();
        assert_eq!(app.screen, Screen::Posts);
        assert!(app.viewer.is_none());
    }

    #[tokio::test]
    async fn toggling_viewed_updates_artist_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = scanned_app(dir.path()).await;
        app.handle_action(AppAction::MoveDown).await.unwrap();
        app.handle_action(AppAction::Select).await.unwrap();
        assert_eq!(app.posts.len(), 1);

        app.handle_action(AppAction::TogglePostViewed).await.unwrap();
        assert!(app.posts[0].viewed);
        assert!(!app.artists[1].has_unviewed);

        app.handle_action(AppAction::ToggleArtistViewed).await.unwrap();
        assert!(!app.posts[0].viewed);
        assert!(app.artists[1].has_unviewed);
    }

    #[tokio::test]
    async fn toggling_artist_in_viewer_uses_current_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = scanned_app(dir.path()).await;
        app.handle_action(AppAction::MoveDown).await.unwrap();
        app.handle_action(AppAction::Select).await.unwrap();
        app.handle_action(AppAction::Select).await.unwrap();
        assert_eq!(app.screen, Screen::Viewer);

        // Opening bob's only post finishes the artist.
        poll_until(&mut app, |app| !app.artists[1].has_unviewed).await;

        app.handle_action(AppAction::ToggleArtistViewed).await.unwrap();
        assert!(app.artists[1].has_unviewed);
        assert!(!app.posts[0].viewed);
    }

    #[tokio::test]
    async fn toggling_artist_without_store_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("missing").join("deeper").join("x.db").to_string_lossy().to_string(),
            ..Config::default()
        };
        let mut app = App::new(config).await.unwrap();
        app.artists.push(Artist {
            id: 7,
            platform: Platform::Pixiv,
            display_name: "carol".to_string(),
            platform_user_id: "7".to_string(),
            service: String::new(),
            folder_name: "carol".to_string(),
            has_unviewed: true,
        });

        app.handle_action(AppAction::ToggleArtistViewed).await.unwrap();
        assert!(app.status_message.is_some());
        assert!(app.artists[0].has_unviewed);
    }

    #[tokio::test]
    async fn unviewed_filter_hides_finished_artists() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = scanned_app(dir.path()).await;
        app.handle_action(AppAction::ToggleArtistViewed).await.unwrap();
        assert!(!app.artists[0].has_unviewed);

        app.handle_action(AppAction::ToggleUnviewedFilter).await.unwrap();
        assert_eq!(app.artists.len(), 1);
        assert!(app.artists[0].has_unviewed);
    }

    #[tokio::test]
    async fn stale_details_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = scanned_app(dir.path()).await;
        app.pending_details_post_id = Some(2);

        app.details_tx
            .send(DetailsResult {
                post_id: 1,
                result: Err("late".to_string()),
            })
            .await
            .unwrap();
        app.poll_details_result();
        assert_eq!(app.details_status, DetailsStatus::Idle);

        app.details_tx
            .send(DetailsResult {
                post_id: 2,
                result: Err("boom".to_string()),
            })
            .await
            .unwrap();
        app.poll_details_result();
        assert_eq!(app.details_status, DetailsStatus::Failed("boom".to_string()));
        assert_eq!(app.pending_details_post_id, None);
    }
}
