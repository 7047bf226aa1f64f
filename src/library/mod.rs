mod import;
mod layout;
mod scan;
mod source;

pub use import::{import_root, ImportSummary};
pub use layout::LibraryLayout;
pub use source::{ContentSource, Library};
