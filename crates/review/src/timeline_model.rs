//! In-memory observation list mirrored to the server and to the table view.
//!
//! Every mutation goes to the server first; local state and table rows only
//! change once the server accepted it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use annotation::timecode::format_millis;
use annotation::{
    AnnotationError, Event, Millis, Observation, ObservationKey, ObservationKind, Organism,
    ReviewSet,
};
use review_client::{ObservationPatch, ReviewClient};
use tracing::{debug, info};

use crate::{ReviewError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Label,
    Time,
    Events,
    Duration,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub key: ObservationKey,
    pub label: String,
    pub time: String,
    pub events: usize,
    pub duration: String,
    pub comment: String,
}

impl TableRow {
    fn from_observation(obs: &Observation) -> Self {
        Self {
            key: obs.key,
            label: obs.label(),
            time: obs.initial_time().map(format_millis).unwrap_or_default(),
            events: obs.events().len(),
            duration: obs.duration.map(format_millis).unwrap_or_default(),
            comment: obs.comment.clone(),
        }
    }

    pub fn cell(&self, column: Column) -> String {
        match column {
            Column::Label => self.label.clone(),
            Column::Time => self.time.clone(),
            Column::Events => self.events.to_string(),
            Column::Duration => self.duration.clone(),
            Column::Comment => self.comment.clone(),
        }
    }
}

/// Marks a scope of programmatic table updates. Edit callbacks raised while
/// any guard is alive must be ignored.
pub struct SuppressGuard {
    depth: Arc<AtomicU32>,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
pub struct TableModel {
    rows: Vec<TableRow>,
    show_duration: bool,
    suppress_depth: Arc<AtomicU32>,
}

impl TableModel {
    pub fn new(show_duration: bool) -> Self {
        Self {
            show_duration,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn row(&self, key: ObservationKey) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    /// Duration is listed only for lead reviewers.
    pub fn columns(&self) -> Vec<Column> {
        let mut cols = vec![Column::Label, Column::Time, Column::Events];
        if self.show_duration {
            cols.push(Column::Duration);
        }
        cols.push(Column::Comment);
        cols
    }

    pub fn is_editable(&self, column: Column) -> bool {
        match column {
            Column::Comment => true,
            Column::Duration => self.show_duration,
            _ => false,
        }
    }

    /// Held by the view while it copies `rows()` into its widgets.
    pub fn suppress(&self) -> SuppressGuard {
        self.suppress_depth.fetch_add(1, Ordering::AcqRel);
        SuppressGuard {
            depth: self.suppress_depth.clone(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress_depth.load(Ordering::Acquire) > 0
    }

    fn push(&mut self, obs: &Observation) {
        self.rows.push(TableRow::from_observation(obs));
    }

    fn refresh(&mut self, obs: &Observation) {
        if let Some(row) = self.rows.iter_mut().find(|r| r.key == obs.key) {
            *row = TableRow::from_observation(obs);
        }
    }

    fn remove(&mut self, key: ObservationKey) {
        self.rows.retain(|r| r.key != key);
    }
}

pub struct ObservationModel {
    set_id: i64,
    organisms: Vec<Organism>,
    observations: Vec<Observation>,
    table: TableModel,
}

impl ObservationModel {
    pub fn from_set(set: &ReviewSet, is_lead: bool) -> Self {
        let mut table = TableModel::new(is_lead);
        for obs in &set.observations {
            table.push(obs);
        }
        Self {
            set_id: set.id,
            organisms: set.organisms.clone(),
            observations: set.observations.clone(),
            table,
        }
    }

    pub fn set_id(&self) -> i64 {
        self.set_id
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn get(&self, key: ObservationKey) -> Option<&Observation> {
        self.observations.iter().find(|o| o.key == key)
    }

    pub fn table(&self) -> &TableModel {
        &self.table
    }

    pub fn organisms(&self) -> &[Organism] {
        &self.organisms
    }

    /// Seek-bar markers: (observation, initial time).
    pub fn markers(&self) -> Vec<(ObservationKey, Millis)> {
        self.observations
            .iter()
            .filter_map(|o| o.initial_time().map(|t| (o.key, t)))
            .collect()
    }

    pub fn add(&mut self, client: &dyn ReviewClient, observation: Observation) -> Result<ObservationKey> {
        if let Some(id) = observation.organism_id {
            if !self.organisms.iter().any(|o| o.id == id) {
                return Err(AnnotationError::UnknownOrganism(id).into());
            }
        }
        let mut stored = client.add_observation(self.set_id, &observation)?;
        stored.key = observation.key;
        self.resolve(&mut stored);
        info!(id = ?stored.id, label = %stored.label(), "observation added");
        self.table.push(&stored);
        let key = stored.key;
        self.observations.push(stored);
        Ok(key)
    }

    pub fn edit(
        &mut self,
        client: &dyn ReviewClient,
        key: ObservationKey,
        patch: &ObservationPatch,
    ) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let index = self.index_of(key)?;
        let current = &self.observations[index];
        if patch.duration.is_some() && current.kind != ObservationKind::Animal {
            return Err(AnnotationError::DurationNotApplicable.into());
        }
        let id = current.id.ok_or(ReviewError::Unsynced)?;
        let mut stored = client.edit_observation(id, patch)?;
        stored.key = key;
        self.resolve(&mut stored);
        debug!(id, "observation edited");
        self.table.refresh(&stored);
        self.observations[index] = stored;
        Ok(())
    }

    pub fn remove(&mut self, client: &dyn ReviewClient, key: ObservationKey) -> Result<Observation> {
        let index = self.index_of(key)?;
        if let Some(id) = self.observations[index].id {
            client.delete_observation(id)?;
        }
        self.table.remove(key);
        let removed = self.observations.remove(index);
        info!(id = ?removed.id, "observation removed");
        Ok(removed)
    }

    /// Duration from the observation's initial time to `position`.
    pub fn set_duration(
        &mut self,
        client: &dyn ReviewClient,
        key: ObservationKey,
        position: Millis,
    ) -> Result<Millis> {
        let duration = self
            .get(key)
            .ok_or(ReviewError::UnknownObservation)?
            .duration_until(position)?;
        self.edit(client, key, &ObservationPatch::duration(duration))?;
        Ok(duration)
    }

    /// Persists the observation's event list extended with `event`.
    pub fn append_event(
        &mut self,
        client: &dyn ReviewClient,
        key: ObservationKey,
        event: Event,
    ) -> Result<()> {
        let obs = self.get(key).ok_or(ReviewError::UnknownObservation)?;
        let mut events = obs.events().to_vec();
        events.push(event);
        self.edit(client, key, &ObservationPatch::events(events))
    }

    /// First observation starting strictly after `position`.
    pub fn next_after(&self, position: Millis) -> Option<(ObservationKey, Millis)> {
        self.markers()
            .into_iter()
            .filter(|(_, t)| *t > position)
            .min_by_key(|(_, t)| *t)
    }

    /// Last observation starting strictly before `position`.
    pub fn prev_before(&self, position: Millis) -> Option<(ObservationKey, Millis)> {
        self.markers()
            .into_iter()
            .filter(|(_, t)| *t < position)
            .max_by_key(|(_, t)| *t)
    }

    fn index_of(&self, key: ObservationKey) -> Result<usize> {
        self.observations
            .iter()
            .position(|o| o.key == key)
            .ok_or(ReviewError::UnknownObservation)
    }

    fn resolve(&self, obs: &mut Observation) {
        obs.organism = obs
            .organism_id
            .and_then(|id| self.organisms.iter().find(|o| o.id == id).cloned());
        obs.sort_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_nests() {
        let table = TableModel::new(false);
        assert!(!table.is_suppressed());
        {
            let _a = table.suppress();
            let _b = table.suppress();
            assert!(table.is_suppressed());
        }
        assert!(!table.is_suppressed());
    }

    #[test]
    fn guard_outlives_row_rebuild() {
        let mut set = ReviewSet::default();
        set.observations.push(Observation::interest(Event::new(1000)));
        let model = ObservationModel::from_set(&set, false);
        assert!(!model.table().is_suppressed());

        let guard = model.table().suppress();
        let copied: Vec<String> = model
            .table()
            .rows()
            .iter()
            .map(|r| r.cell(Column::Time))
            .collect();
        assert!(model.table().is_suppressed());
        drop(guard);
        assert_eq!(copied, vec!["00:00:01.000"]);
        assert!(!model.table().is_suppressed());
    }

    #[test]
    fn duration_column_only_for_leads() {
        assert!(!TableModel::new(false).columns().contains(&Column::Duration));
        assert!(!TableModel::new(false).is_editable(Column::Duration));
        let lead = TableModel::new(true);
        assert!(lead.columns().contains(&Column::Duration));
        assert!(lead.is_editable(Column::Duration));
        assert!(!lead.is_editable(Column::Time));
    }

    #[test]
    fn rows_from_set() {
        let mut set = ReviewSet {
            id: 3,
            ..ReviewSet::default()
        };
        let turtle = Organism {
            id: 9,
            name: "Chelonia mydas".into(),
            common_name: None,
        };
        let mut obs = Observation::animal(&turtle, Event::new(61_500));
        obs.comment = "turtle?".into();
        obs.duration = Some(2000);
        set.observations.push(obs);
        let model = ObservationModel::from_set(&set, true);
        let row = &model.table().rows()[0];
        assert_eq!(row.time, "00:01:01.500");
        assert_eq!(row.cell(Column::Duration), "00:00:02.000");
        assert_eq!(row.cell(Column::Events), "1");
        assert_eq!(row.comment, "turtle?");
    }

    #[test]
    fn navigation_by_initial_time() {
        let mut set = ReviewSet::default();
        for t in [4000, 1000, 9000] {
            set.observations.push(Observation::interest(Event::new(t)));
        }
        let model = ObservationModel::from_set(&set, false);
        assert_eq!(model.next_after(1000).map(|(_, t)| t), Some(4000));
        assert_eq!(model.prev_before(4000).map(|(_, t)| t), Some(1000));
        assert_eq!(model.next_after(9000), None);
    }
}
