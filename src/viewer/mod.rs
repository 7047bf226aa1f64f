mod session;
mod slideshow;

pub use session::{Display, ViewerSession, ViewerSettings};
pub use slideshow::Slideshow;
