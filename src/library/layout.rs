use std::path::{Path, PathBuf};

/// On-disk convention: `{root}/{artist_folder}/{post_folder}/{attachment}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLayout {
    root: PathBuf,
}

impl LibraryLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn post_dir(&self, artist_folder: &str, post_folder: &str) -> PathBuf {
        self.root.join(artist_folder).join(post_folder)
    }

    pub fn attachment_path(&self, artist_folder: &str, post_folder: &str, name: &str) -> PathBuf {
        self.post_dir(artist_folder, post_folder).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_artist_post_and_name() {
        let layout = LibraryLayout::new("/mirror/kemono");
        assert_eq!(
            layout.attachment_path("alice_fanbox_123", "2024-03-01 Sketches", "2.png"),
            PathBuf::from("/mirror/kemono/alice_fanbox_123/2024-03-01 Sketches/2.png")
        );
    }
}
