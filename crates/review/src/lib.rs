//! Review session core: keeps playback, the seek bar, the observation table
//! and the annotation overlay consistent with each other and the server.

use thiserror::Error;

use annotation::AnnotationError;
use playback::PlaybackError;
use review_client::ClientError;

pub mod config;
pub use config::ReviewConfig;
pub mod input;
pub mod menu;
pub mod overlay;
pub mod seek;
mod session;
pub use session::{ReviewSession, SessionEvent};
pub mod timeline_model;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid input: {0}")]
    Validation(#[from] AnnotationError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no set loaded")]
    NoSet,
    #[error("unknown observation")]
    UnknownObservation,
    #[error("observation has not been saved to the server yet")]
    Unsynced,
    #[error("only lead reviewers may {0}")]
    NotPermitted(&'static str),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
