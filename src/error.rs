use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Library error type for playback operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The show has no slides; playback never begins.
    #[error("the show has no slides to play")]
    EmptyShow,

    /// The persisted show could not be loaded or saved.
    #[error(transparent)]
    ShowFile(#[from] show_model::ShowFileError),

    /// An authoring folder is missing or not a directory.
    #[error("not a readable folder: {}", .0.display())]
    BadFolder(PathBuf),

    /// The file is neither a slide image nor an audio track.
    #[error("unsupported media file: {}", .0.display())]
    UnsupportedMedia(PathBuf),

    /// A slide image could not be decoded.
    #[error("failed to decode slide {}", .path.display())]
    SlideDecode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Two frames handed to the renderer did not match the canvas.
    #[error("slide is {actual:?}, canvas is {expected:?}")]
    CanvasMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The decoded deck does not line up with the show's slide list.
    #[error("show has {slides} slides but {images} decoded images")]
    DeckMismatch { slides: usize, images: usize },

    #[error(transparent)]
    Audio(#[from] crate::audio::AudioError),

    /// A background unit did not honor cancellation or its state was lost.
    #[error("concurrency fault: {0}")]
    ConcurrencyFault(String),

    /// Play/pause only exists for automatically advanced shows.
    #[error("the show advances manually; there is no timer to pause")]
    ManualAdvance,

    /// Auto-advance intervals are whole seconds, at least one.
    #[error("invalid interval {}: must be a whole number of seconds, at least 1", humantime::format_duration(*.0))]
    InvalidInterval(Duration),

    /// The controller has already been stopped.
    #[error("playback has been stopped")]
    Stopped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
