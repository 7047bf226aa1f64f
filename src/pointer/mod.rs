//! Sequential navigation over artists, their posts and each post's
//! attachments, paging in posts and attachment lists only when navigation
//! reaches them.

mod marker;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::library::{ContentSource, LibraryLayout};
use crate::models::{Artist, Post, ViewedEvent};

use marker::ViewedMarker;

/// Attachment cursor within the current post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    At(usize),
    /// The post has no attachments; the post itself is the stop.
    Empty,
}

impl Slot {
    fn first(attachments: &[String]) -> Self {
        if attachments.is_empty() {
            Slot::Empty
        } else {
            Slot::At(0)
        }
    }

    fn last(attachments: &[String]) -> Self {
        match attachments.len() {
            0 => Slot::Empty,
            n => Slot::At(n - 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub artist: usize,
    pub post: usize,
    pub slot: Slot,
}

/// Starting state handed over by the list view when a viewer opens.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub artists: Vec<Artist>,
    pub artist_index: usize,
    /// Posts of `artists[artist_index]`, as currently listed.
    pub posts: Vec<Post>,
    pub post_index: usize,
    /// Attachment names of the starting post; fetched when `None`.
    pub attachments: Option<Vec<String>>,
    pub attachment_index: usize,
}

/// A move across a post boundary, fully resolved before it is applied.
struct Step {
    artist_index: usize,
    /// Newly fetched post page for `artist_index`, if it was not cached.
    page: Option<Vec<Post>>,
    post_index: usize,
    attachments: Vec<String>,
    slot: Slot,
}

/// Outcome of a step search: the move, if any, plus every artist the search
/// confirmed has no posts.
struct Resolved {
    step: Option<Step>,
    empty: Vec<usize>,
}

pub struct ContentPointer<S: ContentSource> {
    source: Arc<S>,
    layout: LibraryLayout,
    artists: Vec<Artist>,
    /// Post pages by artist index; the current artist's page is always loaded.
    pages: Vec<Option<Vec<Post>>>,
    /// Artists whose last page-in succeeded with no posts.
    known_empty: Vec<bool>,
    artist_index: usize,
    post_index: usize,
    attachments: Vec<String>,
    slot: Slot,
    marker: ViewedMarker,
}

impl<S: ContentSource> ContentPointer<S> {
    /// Builds a pointer from `snapshot` and marks the starting post viewed.
    /// Viewed notifications for this session arrive on the returned receiver.
    pub async fn load(
        source: Arc<S>,
        layout: LibraryLayout,
        snapshot: Snapshot,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ViewedEvent>)> {
        let Snapshot {
            artists,
            artist_index,
            posts,
            post_index,
            attachments,
            attachment_index,
        } = snapshot;

        if artists.is_empty() || posts.is_empty() {
            return Err(AppError::NoContent);
        }
        let artist_index = artist_index.min(artists.len() - 1);
        let post_index = post_index.min(posts.len() - 1);

        let attachments = match attachments {
            Some(names) => names,
            None => page_attachments(source.as_ref(), posts[post_index].id).await,
        };
        let slot = match attachments.len() {
            0 => Slot::Empty,
            n => Slot::At(attachment_index.min(n - 1)),
        };

        let mut pages = vec![None; artists.len()];
        pages[artist_index] = Some(posts);
        let known_empty = vec![false; artists.len()];

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let marker = ViewedMarker::spawn(Arc::clone(&source), events_tx);

        let pointer = Self {
            source,
            layout,
            artists,
            pages,
            known_empty,
            artist_index,
            post_index,
            attachments,
            slot,
            marker,
        };
        if let Some(post) = pointer.current_post() {
            pointer.marker.mark(post.id);
        }
        debug!(position = ?pointer.position(), "pointer loaded");

        Ok((pointer, events_rx))
    }

    /// Steps forward one attachment, crossing into the next post (and artist)
    /// when the current post is exhausted. Returns whether the post changed.
    /// At the end of the collection this is a no-op returning `false`.
    ///
    /// Nothing is applied until every page-in has resolved, so dropping the
    /// returned future leaves the pointer where it was.
    pub async fn next_image(&mut self) -> bool {
        if let Slot::At(i) = self.slot {
            if i + 1 < self.attachments.len() {
                self.slot = Slot::At(i + 1);
                return false;
            }
        }

        let resolved = self.step_forward().await;
        self.apply(resolved)
    }

    /// Mirror of [`next_image`](Self::next_image); entering an earlier post
    /// lands on its last attachment.
    pub async fn previous_image(&mut self) -> bool {
        if let Slot::At(i) = self.slot {
            if i > 0 {
                self.slot = Slot::At(i - 1);
                return false;
            }
        }

        let resolved = self.step_backward().await;
        self.apply(resolved)
    }

    /// True on the first stop of the collection. Earlier artists count as
    /// empty once a backward step has found them without posts.
    pub fn is_first_post(&self) -> bool {
        self.known_empty[..self.artist_index].iter().all(|empty| *empty)
            && self.post_index == 0
            && matches!(self.slot, Slot::Empty | Slot::At(0))
    }

    /// True on the last stop of the collection. Later artists count as
    /// empty once a forward step has found them without posts.
    pub fn is_last_post(&self) -> bool {
        let last_post = self.current_posts().len().saturating_sub(1);
        self.known_empty[self.artist_index + 1..].iter().all(|empty| *empty)
            && self.post_index == last_post
            && self.slot == Slot::last(&self.attachments)
    }

    pub fn position(&self) -> Position {
        Position {
            artist: self.artist_index,
            post: self.post_index,
            slot: self.slot,
        }
    }

    pub fn artists(&self) -> &[Artist] {
        &self.artists
    }

    pub fn current_artist(&self) -> &Artist {
        &self.artists[self.artist_index]
    }

    pub fn current_posts(&self) -> &[Post] {
        self.pages[self.artist_index].as_deref().unwrap_or_default()
    }

    pub fn current_post(&self) -> Option<&Post> {
        self.current_posts().get(self.post_index)
    }

    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    pub fn current_attachment(&self) -> Option<&str> {
        match self.slot {
            Slot::At(i) => self.attachments.get(i).map(String::as_str),
            Slot::Empty => None,
        }
    }

    /// File on disk for the current attachment; `None` for an empty post.
    pub fn current_file(&self) -> Option<PathBuf> {
        let name = self.current_attachment()?;
        let post = self.current_post()?;
        Some(self.layout.attachment_path(
            &self.current_artist().folder_name,
            &post.folder_name,
            name,
        ))
    }

    /// Directory of the current post, which exists even when it is empty.
    pub fn current_post_dir(&self) -> Option<PathBuf> {
        let post = self.current_post()?;
        Some(
            self.layout
                .post_dir(&self.current_artist().folder_name, &post.folder_name),
        )
    }

    async fn step_forward(&self) -> Resolved {
        let posts = self.current_posts();
        if self.post_index + 1 < posts.len() {
            let post_index = self.post_index + 1;
            let attachments = page_attachments(self.source.as_ref(), posts[post_index].id).await;
            let step = Step {
                artist_index: self.artist_index,
                page: None,
                post_index,
                slot: Slot::first(&attachments),
                attachments,
            };
            return Resolved { step: Some(step), empty: Vec::new() };
        }

        let mut empty = Vec::new();
        for artist_index in self.artist_index + 1..self.artists.len() {
            let (fetched, failed) = self.page_in(artist_index).await;
            let page = fetched
                .as_deref()
                .or(self.pages[artist_index].as_deref())
                .unwrap_or_default();

            if let Some(first) = page.first() {
                let attachments = page_attachments(self.source.as_ref(), first.id).await;
                let step = Step {
                    artist_index,
                    page: fetched,
                    post_index: 0,
                    slot: Slot::first(&attachments),
                    attachments,
                };
                return Resolved { step: Some(step), empty };
            }
            if !failed {
                empty.push(artist_index);
            }
            debug!(artist_id = self.artists[artist_index].id, "skipping artist without posts");
        }

        Resolved { step: None, empty }
    }

    async fn step_backward(&self) -> Resolved {
        if self.post_index > 0 {
            let post_index = self.post_index - 1;
            let post_id = self.current_posts()[post_index].id;
            let attachments = page_attachments(self.source.as_ref(), post_id).await;
            let step = Step {
                artist_index: self.artist_index,
                page: None,
                post_index,
                slot: Slot::last(&attachments),
                attachments,
            };
            return Resolved { step: Some(step), empty: Vec::new() };
        }

        let mut empty = Vec::new();
        for artist_index in (0..self.artist_index).rev() {
            let (fetched, failed) = self.page_in(artist_index).await;
            let page = fetched
                .as_deref()
                .or(self.pages[artist_index].as_deref())
                .unwrap_or_default();

            if let Some(last) = page.last() {
                let attachments = page_attachments(self.source.as_ref(), last.id).await;
                let step = Step {
                    artist_index,
                    post_index: page.len() - 1,
                    page: fetched,
                    slot: Slot::last(&attachments),
                    attachments,
                };
                return Resolved { step: Some(step), empty };
            }
            if !failed {
                empty.push(artist_index);
            }
            debug!(artist_id = self.artists[artist_index].id, "skipping artist without posts");
        }

        Resolved { step: None, empty }
    }

    /// Fetches the page for `artist_index` unless it is cached. Returns the
    /// fetched page, if any, and whether the fetch failed.
    async fn page_in(&self, artist_index: usize) -> (Option<Vec<Post>>, bool) {
        if self.pages[artist_index].is_some() {
            return (None, false);
        }
        let artist_id = self.artists[artist_index].id;
        match self.source.list_posts(artist_id).await {
            Ok(posts) => (Some(posts), false),
            Err(e) => {
                warn!(artist_id, error = %e, kind = "page_in_failure", "failed to page in posts");
                (None, true)
            }
        }
    }

    fn apply(&mut self, resolved: Resolved) -> bool {
        for artist_index in resolved.empty {
            self.known_empty[artist_index] = true;
        }
        match resolved.step {
            Some(step) => {
                self.enter(step);
                true
            }
            None => false,
        }
    }

    fn enter(&mut self, step: Step) {
        if let Some(page) = step.page {
            // Empty pages stay unloaded so a later visit asks again.
            if !page.is_empty() {
                self.pages[step.artist_index] = Some(page);
            }
        }
        self.known_empty[step.artist_index] = false;
        self.artist_index = step.artist_index;
        self.post_index = step.post_index;
        self.attachments = step.attachments;
        self.slot = step.slot;

        if let Some(post) = self.current_post() {
            debug!(post_id = post.id, position = ?self.position(), "entered post");
            self.marker.mark(post.id);
        }
    }
}

async fn page_attachments<S: ContentSource>(source: &S, post_id: i64) -> Vec<String> {
    match source.list_attachments(post_id).await {
        Ok(names) => names,
        Err(e) => {
            warn!(post_id, error = %e, kind = "page_in_failure", "failed to page in attachments");
            Vec::new()
        }
    }
}
