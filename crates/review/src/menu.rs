use annotation::{Millis, Observation, ObservationKey, Organism};

/// Entry picked from the annotation menu after drawing a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationChoice {
    /// New sighting of this organism.
    Organism(Organism),
    /// New generic "of interest" marker.
    OfInterest,
    /// Add an event to an existing observation.
    Existing(ObservationKey),
}

impl AnnotationChoice {
    pub fn label(&self, observations: &[Observation]) -> String {
        match self {
            AnnotationChoice::Organism(o) => o.display_name().to_string(),
            AnnotationChoice::OfInterest => "Of interest".to_string(),
            AnnotationChoice::Existing(key) => observations
                .iter()
                .find(|o| o.key == *key)
                .map(|o| format!("Add to {}", o.label()))
                .unwrap_or_else(|| "Add to observation".to_string()),
        }
    }
}

/// Organisms by name, then "of interest", then observations already under
/// way at `position` (latest first).
pub fn menu_choices(
    organisms: &[Organism],
    observations: &[Observation],
    position: Millis,
) -> Vec<AnnotationChoice> {
    let mut sorted: Vec<&Organism> = organisms.iter().collect();
    sorted.sort_by_key(|o| o.display_name().to_lowercase());
    let mut choices: Vec<AnnotationChoice> = sorted
        .into_iter()
        .cloned()
        .map(AnnotationChoice::Organism)
        .collect();
    choices.push(AnnotationChoice::OfInterest);

    let mut open: Vec<&Observation> = observations
        .iter()
        .filter(|o| o.initial_time().is_some_and(|t| t <= position))
        .collect();
    open.sort_by_key(|o| std::cmp::Reverse(o.initial_time()));
    choices.extend(open.into_iter().map(|o| AnnotationChoice::Existing(o.key)));
    choices
}
