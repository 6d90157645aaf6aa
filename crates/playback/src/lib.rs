//! Playback state machine driven by a periodic tick.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use media_io::{DecodeError, OpenError};

mod engine;
pub use engine::{PlaybackConfig, PlaybackEngine};
mod ticker;
pub use ticker::Ticker;

/// Milliseconds into the video.
pub type Millis = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlayState {
    #[default]
    NotReady,
    Paused,
    Playing,
    SeekBack,
    SeekForward,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    PositionChanged(Millis),
    StateChanged(PlayState),
    /// Emitted every `progress_report_ms` of advanced video position.
    ProgressUpdate(Millis),
    /// 0.0 when paused.
    SpeedChanged(f64),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no media loaded")]
    NotLoaded,
    #[error("cannot open media: {0}")]
    Open(#[from] OpenError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid playback speed {0}")]
    InvalidSpeed(f64),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
