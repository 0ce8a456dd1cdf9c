//! Track decoding and audio output used by the background audio player.

mod convert;
mod decode;
mod output;

use std::path::PathBuf;

use thiserror::Error;

pub use convert::FormatConverter;
pub use decode::{PcmFormat, TrackDecoder};
pub use output::{AudioOutput, CpalDevice, OutputDevice, RateRange, negotiate};

/// Per-track audio faults. None of these stop the show: the player skips the
/// track and moves on.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to open audio track {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode audio track {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("{} contains no playable audio stream", .path.display())]
    NoTrack { path: PathBuf },

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("audio output error: {0}")]
    Output(String),

    #[error("audio format conversion failed: {0}")]
    Resample(String),

    /// The device stopped taking samples for longer than the write timeout.
    #[error("audio output stalled")]
    OutputStalled,
}
