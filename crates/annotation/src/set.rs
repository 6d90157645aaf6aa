use crate::{Millis, Observation, Organism};
use serde::{Deserialize, Serialize};

/// One video under review: candidate organisms, the observations recorded
/// so far and the furthest position the reviewer has reached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewSet {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub video_file: String,
    #[serde(default)]
    pub organisms: Vec<Organism>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    /// Progress watermark in ms.
    #[serde(default)]
    pub progress: Millis,
    #[serde(default)]
    pub done: bool,
}

impl ReviewSet {
    pub fn organism(&self, id: i64) -> Option<&Organism> {
        self.organisms.iter().find(|o| o.id == id)
    }

    /// Fill each observation's `organism` from its `organism_id` and put
    /// events in creation order. Called once after loading from the server.
    pub fn resolve(&mut self) {
        let organisms = &self.organisms;
        for obs in &mut self.observations {
            obs.organism = obs
                .organism_id
                .and_then(|id| organisms.iter().find(|o| o.id == id).cloned());
            obs.sort_events();
        }
    }

    /// Advance the watermark; it never moves backwards.
    pub fn advance_progress(&mut self, position: Millis) -> bool {
        if position > self.progress {
            self.progress = position;
            true
        } else {
            false
        }
    }
}
