//! Remote review server operations used by the annotation session.

use annotation::{Event, Millis, Observation, ReviewSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod http;
pub use http::HttpReviewClient;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("query failed ({status}): {message}")]
    QueryFailed { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("not logged in")]
    NotLoggedIn,
}

impl ClientError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            status_message(status).to_string()
        } else {
            format!("{}: {body}", status_message(status))
        };
        ClientError::QueryFailed { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::QueryFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Human-readable summary for an HTTP status.
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Authentication required",
        403 => "Permission denied",
        404 => "Not found",
        409 => "Conflicting change",
        413 => "Request too large",
        429 => "Too many requests",
        500..=599 => "Server error",
        _ => "Unexpected response",
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    /// Leads may seek past the progress watermark and edit durations.
    #[serde(default)]
    pub is_lead: bool,
}

/// Partial observation update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Millis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organism_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
}

impl ObservationPatch {
    pub fn duration(duration: Millis) -> Self {
        Self {
            duration: Some(duration),
            ..Self::default()
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    pub fn organism(organism_id: i64) -> Self {
        Self {
            organism_id: Some(organism_id),
            ..Self::default()
        }
    }

    pub fn events(events: Vec<Event>) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copies the set fields onto `obs`. Organism resolution is the caller's.
    pub fn apply_to(&self, obs: &mut Observation) {
        if let Some(d) = self.duration {
            obs.duration = Some(d);
        }
        if let Some(c) = &self.comment {
            obs.comment = c.clone();
        }
        if let Some(id) = self.organism_id {
            obs.organism_id = Some(id);
        }
        if let Some(events) = &self.events {
            obs.replace_events(events.clone());
        }
    }
}

/// Operations the session needs from the review server.
///
/// Calls block until the server answers. Implementations keep their own
/// session state (auth token), hence `&self`.
pub trait ReviewClient: Send {
    fn login(&self, username: &str, password: &str) -> Result<UserProfile>;

    fn set_detail(&self, set_id: i64) -> Result<ReviewSet>;

    /// Returns the stored observation with server-assigned ids.
    fn add_observation(&self, set_id: i64, observation: &Observation) -> Result<Observation>;

    fn edit_observation(&self, observation_id: i64, patch: &ObservationPatch)
        -> Result<Observation>;

    fn delete_observation(&self, observation_id: i64) -> Result<()>;

    fn update_progress(&self, set_id: i64, progress: Millis) -> Result<()>;

    fn mark_set_done(&self, set_id: i64) -> Result<()>;
}
