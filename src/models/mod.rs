mod artist;
mod platform;
mod post;
mod view;

pub use artist::{Artist, NewArtist};
pub use platform::Platform;
pub use post::{NewPost, Post, ViewedChange, ViewedEvent};
pub use view::{PostQuery, PostSort, SortKey, SortOrder};
