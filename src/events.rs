use std::path::PathBuf;
use std::time::Duration;

use show_model::SlideEffect;

/// Events kept for a subscriber that falls behind. Older ones are dropped
/// first; with no subscriber nothing is kept.
pub const EVENT_BACKLOG: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Showing a slide with no timer running (manual shows, or paused).
    Paused,
    /// Showing a slide while the auto-advance timer runs.
    Playing,
    /// An animation towards another slide is in flight.
    Transitioning,
}

/// Snapshot of the playback state. Published whole, so readers never see a
/// half-applied slide change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_index: usize,
    pub mode: PlaybackMode,
    pub is_audio_playing: bool,
}

/// Requests funnelled through the scheduler's command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    Navigate(Direction),
    SetAutoAdvance(bool),
    SetInterval(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    TransitionStarted {
        from: usize,
        to: usize,
        effect: SlideEffect,
    },
    TransitionCancelled {
        from: usize,
        to: usize,
    },
    SlideCommitted {
        index: usize,
    },
    ModeChanged(PlaybackMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    TrackStarted { index: usize, path: PathBuf },
    TrackFinished { index: usize },
    TrackSkipped { index: usize, path: PathBuf, reason: String },
    Paused,
    Resumed,
    /// A full pass over the track list played nothing; the player gave up.
    Exhausted,
    Stopped,
}
