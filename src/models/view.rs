use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Published,
    Title,
    Folder,
}

impl SortKey {
    pub fn cycle(&self) -> Self {
        match self {
            SortKey::Published => SortKey::Title,
            SortKey::Title => SortKey::Folder,
            SortKey::Folder => SortKey::Published,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Published => "Date",
            SortKey::Title => "Title",
            SortKey::Folder => "Folder",
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortKey::Published => "published_at",
            SortKey::Title => "title COLLATE NOCASE",
            SortKey::Folder => "folder_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn cycle(&self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "↑",
            SortOrder::Descending => "↓",
        }
    }

    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostSort {
    pub key: SortKey,
    pub order: SortOrder,
}

impl PostSort {
    /// ORDER BY clause for the posts table. Ties fall back to the folder name so
    /// paging is stable across queries.
    pub(crate) fn order_by(&self) -> String {
        let order = self.order.keyword();
        match self.key {
            SortKey::Published => format!(
                "published_at {order} NULLS LAST, folder_name {order}"
            ),
            key => format!("{} {order}, folder_name {order}", key.column()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostQuery {
    pub sort: PostSort,
    pub only_unviewed: bool,
}
