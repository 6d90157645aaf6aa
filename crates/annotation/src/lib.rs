//! Annotation data model for survey video review.
//!
//! Geometry (pixel points and rectangles), the drag `Highlighter`, the
//! normalized `Extent` polygon, and the `Observation`/`Event`/`ReviewSet`
//! records exchanged with the review server.

use thiserror::Error;

mod geometry;
pub use geometry::*;
mod highlighter;
pub use highlighter::*;
mod extent;
pub use extent::*;
mod observation;
pub use observation::*;
mod set;
pub use set::*;
pub mod timecode;

#[derive(Debug, Error, PartialEq)]
pub enum AnnotationError {
    #[error("duration must be positive (got {0} ms)")]
    NonPositiveDuration(Millis),
    #[error("only organism sightings carry a duration")]
    DurationNotApplicable,
    #[error("observation has no events")]
    NoEvents,
    #[error("extent is empty")]
    EmptyExtent,
    #[error("malformed extent text: {0}")]
    MalformedExtent(String),
    #[error("unknown organism: {0}")]
    UnknownOrganism(i64),
    #[error("invalid timecode: {0}")]
    InvalidTimecode(String),
}

/// Milliseconds into the video. Shares the playback engine's timebase.
pub type Millis = i64;
