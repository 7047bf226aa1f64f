mod decoder;
mod scheduler;

pub use decoder::{
    decode_file, first_frame_only, AnimationFrame, AnimationKind, DecodedAnimation,
};
pub use scheduler::{PlaybackEvent, PlaybackScheduler, PlaybackState};
