use crate::{AnnotationError, Extent, Millis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local handle for an observation, stable before and after the server
/// assigns its numeric id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ObservationKey(pub Uuid);

impl ObservationKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObservationKey {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    /// Sighting of an identified organism.
    Animal,
    /// Generic "of interest" marker.
    Interest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organism {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub common_name: Option<String>,
}

impl Organism {
    pub fn display_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.name)
    }
}

/// One timestamped, spatially bounded sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: Option<i64>,
    pub event_time: Millis,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub extent: Extent,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub max_count: Option<u32>,
}

impl Event {
    pub fn new(event_time: Millis) -> Self {
        Self {
            id: None,
            event_time,
            attributes: Vec::new(),
            note: String::new(),
            extent: Extent::new(),
            created_at: Utc::now(),
            max_count: None,
        }
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Adds a tag, keeping insertion order. Returns false if already present.
    pub fn add_attribute(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.attributes.contains(&tag) {
            return false;
        }
        self.attributes.push(tag);
        true
    }

    pub fn remove_attribute(&mut self, tag: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|t| t != tag);
        before != self.attributes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(skip)]
    pub key: ObservationKey,
    #[serde(default)]
    pub id: Option<i64>,
    pub kind: ObservationKind,
    #[serde(default)]
    pub organism_id: Option<i64>,
    /// Resolved from `organism_id` against the set's organism list.
    #[serde(skip)]
    pub organism: Option<Organism>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub duration: Option<Millis>,
    /// Ordered by `created_at`.
    #[serde(default)]
    events: Vec<Event>,
}

impl Observation {
    pub fn animal(organism: &Organism, first: Event) -> Self {
        Self {
            key: ObservationKey::new(),
            id: None,
            kind: ObservationKind::Animal,
            organism_id: Some(organism.id),
            organism: Some(organism.clone()),
            comment: String::new(),
            duration: None,
            events: vec![first],
        }
    }

    pub fn interest(first: Event) -> Self {
        Self {
            key: ObservationKey::new(),
            id: None,
            kind: ObservationKind::Interest,
            organism_id: None,
            organism: None,
            comment: String::new(),
            duration: None,
            events: vec![first],
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    /// Inserts keeping creation order; ties keep arrival order.
    pub fn add_event(&mut self, event: Event) {
        let idx = self
            .events
            .partition_point(|e| e.created_at <= event.created_at);
        self.events.insert(idx, event);
    }

    pub fn replace_events(&mut self, events: Vec<Event>) {
        self.events = events;
        self.sort_events();
    }

    pub fn sort_events(&mut self) {
        self.events.sort_by_key(|e| e.created_at);
    }

    /// Earliest-created event.
    pub fn initial_event(&self) -> Option<&Event> {
        self.events.first()
    }

    pub fn initial_time(&self) -> Option<Millis> {
        self.initial_event().map(|e| e.event_time)
    }

    /// Duration from the initial event to `position`; must be positive.
    pub fn duration_until(&self, position: Millis) -> Result<Millis, AnnotationError> {
        if self.kind != ObservationKind::Animal {
            return Err(AnnotationError::DurationNotApplicable);
        }
        let start = self.initial_time().ok_or(AnnotationError::NoEvents)?;
        let duration = position - start;
        if duration <= 0 {
            return Err(AnnotationError::NonPositiveDuration(duration));
        }
        Ok(duration)
    }

    pub fn label(&self) -> String {
        match (self.kind, &self.organism) {
            (ObservationKind::Animal, Some(o)) => o.display_name().to_string(),
            (ObservationKind::Animal, None) => match self.organism_id {
                Some(id) => format!("Organism #{id}"),
                None => "Unidentified".to_string(),
            },
            (ObservationKind::Interest, _) => "Of interest".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn fish() -> Organism {
        Organism {
            id: 7,
            name: "Chromis viridis".into(),
            common_name: Some("Blue green damselfish".into()),
        }
    }

    #[test]
    fn initial_time_follows_creation_not_event_time() {
        let first = Event::new(5000).with_created_at(at(0));
        let mut obs = Observation::animal(&fish(), first);
        obs.add_event(Event::new(1000).with_created_at(at(10)));
        obs.add_event(Event::new(9000).with_created_at(at(5)));

        assert_eq!(obs.initial_time(), Some(5000));
        let times: Vec<_> = obs.events().iter().map(|e| e.event_time).collect();
        assert_eq!(times, vec![5000, 9000, 1000]);
    }

    #[test]
    fn duration_must_be_positive() {
        let obs = Observation::animal(&fish(), Event::new(2000));
        assert_eq!(
            obs.duration_until(1500),
            Err(AnnotationError::NonPositiveDuration(-500))
        );
        assert_eq!(
            obs.duration_until(2000),
            Err(AnnotationError::NonPositiveDuration(0))
        );
        assert_eq!(obs.duration_until(2600), Ok(600));
    }

    #[test]
    fn interest_has_no_duration() {
        let obs = Observation::interest(Event::new(2000));
        assert_eq!(
            obs.duration_until(2600),
            Err(AnnotationError::DurationNotApplicable)
        );
    }

    #[test]
    fn attributes_are_an_ordered_set() {
        let mut ev = Event::new(0);
        assert!(ev.add_attribute("feeding"));
        assert!(ev.add_attribute("juvenile"));
        assert!(!ev.add_attribute("feeding"));
        assert_eq!(ev.attributes(), ["feeding", "juvenile"]);
        assert!(ev.remove_attribute("feeding"));
        assert_eq!(ev.attributes(), ["juvenile"]);
    }

    #[test]
    fn labels() {
        let obs = Observation::animal(&fish(), Event::new(0));
        assert_eq!(obs.label(), "Blue green damselfish");
        let obs = Observation::interest(Event::new(0));
        assert_eq!(obs.label(), "Of interest");
    }

    #[test]
    fn wire_format_skips_local_fields() {
        let obs = Observation::animal(&fish(), Event::new(1200));
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["kind"], "Animal");
        assert_eq!(json["organism_id"], 7);
        assert!(json.get("organism").is_none());
        assert!(json.get("key").is_none());
        assert_eq!(json["events"][0]["event_time"], 1200);
    }
}
