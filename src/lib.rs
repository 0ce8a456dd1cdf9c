pub mod audio;
pub mod authoring;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod events;
pub mod processing {
    pub mod transition;
}
pub mod tasks {
    pub mod audio;
    pub mod loader;
    pub mod scheduler;
    pub mod viewer;
}

pub use controller::{PlaybackController, PlaybackOptions};
pub use display::{DisplaySurface, NullSurface};
pub use error::{Error, Result};
pub use events::{AudioEvent, Direction, PlaybackEvent, PlaybackMode, PlaybackState};
pub use processing::transition::{Rect, TransitionFrame, TransitionRenderer};
pub use show_model;
pub use tasks::loader::SlideDeck;
