use std::time::{Duration, Instant};

use annotation::{Millis, Observation, ReviewSet};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{ClientError, ObservationPatch, Result, ReviewClient, UserProfile};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(flatten)]
    profile: UserProfile,
}

/// JSON-over-HTTP client with token authentication.
pub struct HttpReviewClient {
    base_url: String,
    agent: ureq::Agent,
    token: Mutex<Option<String>>,
}

impl HttpReviewClient {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            token: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.lock().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, method: &str, path: &str) -> Result<ureq::Request> {
        let token = self.token.lock().clone().ok_or(ClientError::NotLoggedIn)?;
        Ok(self
            .agent
            .request(method, &self.url(path))
            .set("Accept", "application/json")
            .set("Authorization", &format!("Token {token}")))
    }

    fn send(&self, request: ureq::Request, payload: Option<Value>) -> Result<String> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let start = Instant::now();
        let response = match payload {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => request.call(),
        };
        match response {
            Ok(resp) => {
                debug!(%method, %url, elapsed = ?start.elapsed(), "request ok");
                resp.into_string()
                    .map_err(|e| ClientError::Transport(format!("read response: {e}")))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                warn!(%method, %url, status = code, "request rejected");
                Err(ClientError::from_status(code, &text))
            }
            Err(err) => {
                warn!(%method, %url, "request failed: {err}");
                Err(ClientError::Transport(err.to_string()))
            }
        }
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        request: ureq::Request,
        payload: Option<Value>,
    ) -> Result<T> {
        let body = self.send(request, payload)?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

impl ReviewClient for HttpReviewClient {
    fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let request = self.agent.post(&self.url("login"));
        let resp: LoginResponse = self.send_json(
            request,
            Some(json!({ "username": username, "password": password })),
        )?;
        *self.token.lock() = Some(resp.token);
        info!(user = %resp.profile.username, lead = resp.profile.is_lead, "logged in");
        Ok(resp.profile)
    }

    fn set_detail(&self, set_id: i64) -> Result<ReviewSet> {
        let request = self.authorized("GET", &format!("sets/{set_id}"))?;
        let mut set: ReviewSet = self.send_json(request, None)?;
        set.resolve();
        debug!(set_id, observations = set.observations.len(), "set loaded");
        Ok(set)
    }

    fn add_observation(&self, set_id: i64, observation: &Observation) -> Result<Observation> {
        let request = self.authorized("POST", &format!("sets/{set_id}/observations"))?;
        let payload = Self::to_value(observation)?;
        self.send_json(request, Some(payload))
    }

    fn edit_observation(
        &self,
        observation_id: i64,
        patch: &ObservationPatch,
    ) -> Result<Observation> {
        let request = self.authorized("PATCH", &format!("observations/{observation_id}"))?;
        let payload = Self::to_value(patch)?;
        self.send_json(request, Some(payload))
    }

    fn delete_observation(&self, observation_id: i64) -> Result<()> {
        let request = self.authorized("DELETE", &format!("observations/{observation_id}"))?;
        self.send(request, None).map(|_| ())
    }

    fn update_progress(&self, set_id: i64, progress: Millis) -> Result<()> {
        let request = self.authorized("PUT", &format!("sets/{set_id}/progress"))?;
        self.send(request, Some(json!({ "progress": progress })))
            .map(|_| ())
    }

    fn mark_set_done(&self, set_id: i64) -> Result<()> {
        let request = self.authorized("POST", &format!("sets/{set_id}/done"))?;
        self.send(request, Some(json!({ "done": true }))).map(|_| ())
    }
}
