use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use annotation::{
    AnnotationError, Event, Extent, Millis, Observation, Organism, Point, Rect, ReviewSet,
};
use media_io::synthetic::{SyntheticOpener, SyntheticSource};
use parking_lot::Mutex;
use playback::PlayState;
use review::input::{Key, Modifiers};
use review::menu::AnnotationChoice;
use review::timeline_model::Column;
use review::{ReviewConfig, ReviewError, ReviewSession, SessionEvent};
use review_client::{ClientError, ObservationPatch, ReviewClient, UserProfile};

const SET_ID: i64 = 7;
const FISH_EXTENT: &str = "POLYGON ((0.25 0.25, 0.5 0.25, 0.5 0.5, 0.25 0.5, 0.25 0.25))";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Login(String),
    SetDetail(i64),
    Add(i64),
    Edit(i64),
    Delete(i64),
    Progress(i64, Millis),
    Done(i64),
}

struct FakeState {
    profile: UserProfile,
    set: ReviewSet,
    stored: HashMap<i64, Observation>,
    calls: Vec<Call>,
    next_id: i64,
    fail_adds: bool,
}

/// In-memory server that records every call.
#[derive(Clone)]
struct FakeClient(Arc<Mutex<FakeState>>);

impl FakeClient {
    fn new(set: ReviewSet, is_lead: bool) -> Self {
        let stored = set
            .observations
            .iter()
            .filter_map(|o| o.id.map(|id| (id, o.clone())))
            .collect();
        Self(Arc::new(Mutex::new(FakeState {
            profile: UserProfile {
                username: if is_lead { "lead" } else { "reviewer" }.into(),
                is_lead,
            },
            set,
            stored,
            calls: Vec::new(),
            next_id: 500,
            fail_adds: false,
        })))
    }

    fn calls(&self) -> Vec<Call> {
        self.0.lock().calls.clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn fail_adds(&self) {
        self.0.lock().fail_adds = true;
    }
}

fn assign_event_ids(state: &mut FakeState, obs: &mut Observation) {
    for event in obs.events_mut() {
        if event.id.is_none() {
            state.next_id += 1;
            event.id = Some(state.next_id);
        }
    }
}

impl ReviewClient for FakeClient {
    fn login(&self, username: &str, _password: &str) -> review_client::Result<UserProfile> {
        let mut s = self.0.lock();
        s.calls.push(Call::Login(username.to_string()));
        Ok(s.profile.clone())
    }

    fn set_detail(&self, set_id: i64) -> review_client::Result<ReviewSet> {
        let mut s = self.0.lock();
        s.calls.push(Call::SetDetail(set_id));
        if set_id != s.set.id {
            return Err(ClientError::from_status(404, ""));
        }
        Ok(s.set.clone())
    }

    fn add_observation(
        &self,
        set_id: i64,
        observation: &Observation,
    ) -> review_client::Result<Observation> {
        let mut s = self.0.lock();
        s.calls.push(Call::Add(set_id));
        if s.fail_adds {
            return Err(ClientError::from_status(500, "database unavailable"));
        }
        let mut stored = observation.clone();
        s.next_id += 1;
        let id = s.next_id;
        stored.id = Some(id);
        assign_event_ids(&mut s, &mut stored);
        s.stored.insert(id, stored.clone());
        Ok(stored)
    }

    fn edit_observation(
        &self,
        observation_id: i64,
        patch: &ObservationPatch,
    ) -> review_client::Result<Observation> {
        let mut s = self.0.lock();
        s.calls.push(Call::Edit(observation_id));
        let Some(mut obs) = s.stored.get(&observation_id).cloned() else {
            return Err(ClientError::from_status(404, ""));
        };
        patch.apply_to(&mut obs);
        assign_event_ids(&mut s, &mut obs);
        s.stored.insert(observation_id, obs.clone());
        Ok(obs)
    }

    fn delete_observation(&self, observation_id: i64) -> review_client::Result<()> {
        let mut s = self.0.lock();
        s.calls.push(Call::Delete(observation_id));
        s.stored.remove(&observation_id);
        Ok(())
    }

    fn update_progress(&self, set_id: i64, progress: Millis) -> review_client::Result<()> {
        self.0.lock().calls.push(Call::Progress(set_id, progress));
        Ok(())
    }

    fn mark_set_done(&self, set_id: i64) -> review_client::Result<()> {
        self.0.lock().calls.push(Call::Done(set_id));
        Ok(())
    }
}

fn chromis() -> Organism {
    Organism {
        id: 3,
        name: "Chromis viridis".into(),
        common_name: None,
    }
}

/// 10 s video, one fish sighted at 1000 ms, reviewed up to 5000 ms.
fn reef_set(progress: Millis) -> ReviewSet {
    let mut extent = Extent::new();
    extent.from_text(FISH_EXTENT);
    let mut event = Event::new(1000).with_extent(extent);
    event.id = Some(11);
    let mut obs = Observation::animal(&chromis(), event);
    obs.id = Some(100);
    ReviewSet {
        id: SET_ID,
        name: "Transect 2".into(),
        video_file: "reef.mp4".into(),
        organisms: vec![chromis()],
        observations: vec![obs],
        progress,
        done: false,
    }
}

fn test_config() -> ReviewConfig {
    ReviewConfig {
        media_dir: PathBuf::from("/nonexistent/annotator-media"),
        tick_interval_ms: Some(40),
        ..ReviewConfig::default()
    }
}

fn open_session(client: &FakeClient, config: ReviewConfig) -> ReviewSession {
    let opener = SyntheticOpener::new().with("reef.mp4", SyntheticSource::with_duration(10.0, 25.0));
    let mut session = ReviewSession::new(config, Box::new(client.clone()), Box::new(opener));
    session.login("someone", "secret").unwrap();
    session.open_set(SET_ID).unwrap();
    session.set_view_size(640, 360);
    session
}

#[test]
fn tick_click_freezes_overlay_on_event_extent() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());
    let events = session.events();
    let key = session.model().unwrap().observations()[0].key;

    assert_eq!(session.seek().ticks()[0].x, 100);
    session.seek_pointer_down(100).unwrap();

    assert_eq!(session.position(), 1000);
    assert_eq!(session.engine().state(), PlayState::Paused);
    assert!(session.overlay().is_frozen());
    assert_eq!(session.overlay().frame().map(|f| f.position_ms), Some(1000));
    assert_eq!(
        session.overlay().highlight_rect(),
        Some(Rect::new(160, 90, 160, 90))
    );
    assert_eq!(session.selected(), Some((key, 0)));
    assert!(events
        .try_iter()
        .any(|e| e == SessionEvent::TickSelected { key, event_index: 0 }));
}

#[test]
fn event_past_progress_is_not_selected() {
    let client = FakeClient::new(reef_set(500), false);
    let mut session = open_session(&client, test_config());
    let events = session.events();
    let key = session.model().unwrap().observations()[0].key;

    session.select_observation(key, 0).unwrap();

    assert_eq!(session.position(), 500);
    assert_eq!(session.selected(), None);
    assert_eq!(session.overlay().highlight_rect(), None);
    assert!(!events
        .try_iter()
        .any(|e| matches!(e, SessionEvent::TickSelected { .. })));
}

#[test]
fn adding_annotation_at_3000() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());

    assert_eq!(session.seek_to(3000).unwrap(), 3000);
    assert!(session.begin_highlight(Point::new(64, 36)));
    session.drag_highlight(Point::new(200, 100));
    session.end_highlight(Point::new(320, 180));

    let key = session
        .commit_annotation(AnnotationChoice::Organism(chromis()))
        .unwrap();

    let model = session.model().unwrap();
    assert_eq!(model.len(), 2);
    assert_eq!(client.count(|c| matches!(c, Call::Add(SET_ID))), 1);
    let added = model.get(key).unwrap();
    assert!(added.id.is_some());
    assert_eq!(added.initial_time(), Some(3000));
    let extent = &added.events()[0].extent;
    assert!(!extent.is_empty());
    assert_eq!(extent.as_rect(360.0, 640.0), Rect::new(64, 36, 256, 144));
    assert_eq!(added.label(), "Chromis viridis");
    assert_eq!(session.seek().ticks().len(), 2);
    assert_eq!(model.table().rows().len(), 2);
    assert_eq!(session.overlay().highlight_rect(), None);
}

#[test]
fn remote_failure_leaves_model_unchanged() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());
    client.fail_adds();

    let err = session
        .commit_annotation(AnnotationChoice::OfInterest)
        .unwrap_err();
    assert!(matches!(
        err,
        ReviewError::Client(ClientError::QueryFailed { status: 500, .. })
    ));
    assert_eq!(session.model().unwrap().len(), 1);
    assert_eq!(session.seek().ticks().len(), 1);
}

#[test]
fn reviewers_are_gated_by_progress_but_leads_are_not() {
    let reviewer = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&reviewer, test_config());
    assert_eq!(session.seek_to(8000).unwrap(), 5000);
    session.seek_pointer_down(800).unwrap();
    session.seek_pointer_up(800).unwrap();
    assert_eq!(session.position(), 5000);

    let lead = FakeClient::new(reef_set(5000), true);
    let mut session = open_session(&lead, test_config());
    assert_eq!(session.seek_to(8000).unwrap(), 8000);
    session.seek_pointer_down(900).unwrap();
    assert_eq!(session.position(), 9000);
}

#[test]
fn set_duration_rejects_non_positive() {
    let client = FakeClient::new(reef_set(5000), true);
    let mut session = open_session(&client, test_config());
    let key = session.model().unwrap().observations()[0].key;

    session.seek_to(500).unwrap();
    let err = session.set_duration(key).unwrap_err();
    assert!(matches!(
        err,
        ReviewError::Validation(AnnotationError::NonPositiveDuration(-500))
    ));
    session.seek_to(1000).unwrap();
    assert!(session.set_duration(key).is_err());
    assert_eq!(client.count(|c| matches!(c, Call::Edit(_))), 0);

    session.seek_to(2500).unwrap();
    assert_eq!(session.set_duration(key).unwrap(), 1500);
    let model = session.model().unwrap();
    assert_eq!(model.get(key).unwrap().duration, Some(1500));
    assert_eq!(model.table().row(key).unwrap().duration, "00:00:01.500");
}

#[test]
fn interest_markers_take_no_duration() {
    let client = FakeClient::new(reef_set(5000), true);
    let mut session = open_session(&client, test_config());
    session.seek_to(3000).unwrap();
    let key = session
        .commit_annotation(AnnotationChoice::OfInterest)
        .unwrap();

    session.seek_to(4000).unwrap();
    let err = session.set_duration(key).unwrap_err();
    assert!(matches!(
        err,
        ReviewError::Validation(AnnotationError::DurationNotApplicable)
    ));
    assert!(session
        .edit_cell(key, Column::Duration, "00:00:01.000")
        .is_err());
    assert_eq!(client.count(|c| matches!(c, Call::Edit(_))), 0);
    assert_eq!(session.model().unwrap().get(key).unwrap().duration, None);
}

#[test]
fn progress_is_tracked_and_pushed() {
    let client = FakeClient::new(reef_set(0), false);
    let config = ReviewConfig {
        progress_report_ms: 1000,
        ..test_config()
    };
    let mut session = open_session(&client, config);
    assert_eq!(session.seek().gate(), Some(0));

    session.play().unwrap();
    for _ in 0..30 {
        session.tick();
    }
    assert_eq!(session.position(), 1200);
    assert!(client.calls().contains(&Call::Progress(SET_ID, 1000)));
    assert_eq!(session.set().unwrap().progress, 1200);
    assert_eq!(session.seek().gate(), Some(1200));
}

#[test]
fn playing_clears_highlight_and_goes_live() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());
    assert!(session.begin_highlight(Point::new(10, 10)));
    session.drag_highlight(Point::new(90, 60));

    session.play().unwrap();
    assert!(!session.overlay().is_frozen());
    assert_eq!(session.overlay().highlight_rect(), None);
    assert!(!session.begin_highlight(Point::new(10, 10)));

    session.pause();
    assert!(session.overlay().is_frozen());
    assert!(session.overlay().frame().is_some());
}

#[test]
fn keyboard_commands() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());
    let none = Modifiers::NONE;

    session.handle_key(none, Key::ArrowRight).unwrap();
    assert_eq!(session.position(), 1000);
    session.handle_key(none, Key::ArrowLeft).unwrap();
    assert_eq!(session.position(), 0);

    session.handle_key(none, Key::Char('n')).unwrap();
    let key = session.model().unwrap().observations()[0].key;
    assert_eq!(session.selected(), Some((key, 0)));
    assert_eq!(session.position(), 1000);

    // Ctrl+S with a selection adds an event to that observation.
    session.seek_to(2000).unwrap();
    session.handle_key(Modifiers::CTRL, Key::Char('s')).unwrap();
    assert_eq!(client.count(|c| matches!(c, Call::Edit(100))), 1);
    let obs = session.model().unwrap().get(key).unwrap();
    assert_eq!(obs.events().len(), 2);
    assert!(obs.events().iter().all(|e| e.id.is_some()));

    session.handle_key(Modifiers::SHIFT, Key::ArrowRight).unwrap();
    assert_eq!(session.engine().state(), PlayState::SeekForward);
    assert_eq!(session.engine().speed(), 2.0);

    session.handle_key(none, Key::Space).unwrap();
    assert_eq!(session.engine().state(), PlayState::Paused);
    assert_eq!(session.handle_key(none, Key::Char('q')).unwrap(), None);
}

#[test]
fn table_edits_respect_suppression_and_role() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());
    let key = session.model().unwrap().observations()[0].key;

    {
        let _guard = session.model().unwrap().table().suppress();
        assert!(!session.edit_cell(key, Column::Comment, "ignored").unwrap());
    }
    assert!(session.edit_cell(key, Column::Comment, "two fish").unwrap());
    assert_eq!(session.model().unwrap().table().row(key).unwrap().comment, "two fish");
    assert!(matches!(
        session.edit_cell(key, Column::Duration, "00:00:02.000"),
        Err(ReviewError::NotPermitted(_))
    ));
    assert!(!session.model().unwrap().table().columns().contains(&Column::Duration));
    assert_eq!(client.count(|c| matches!(c, Call::Edit(100))), 1);
}

#[test]
fn remove_and_finish() {
    let client = FakeClient::new(reef_set(5000), false);
    let mut session = open_session(&client, test_config());
    let key = session.model().unwrap().observations()[0].key;
    session.select_observation(key, 0).unwrap();

    session.remove_observation(key).unwrap();
    assert!(client.calls().contains(&Call::Delete(100)));
    assert!(session.model().unwrap().is_empty());
    assert!(session.seek().ticks().is_empty());
    assert_eq!(session.selected(), None);

    session.finish_set().unwrap();
    assert!(client.calls().contains(&Call::Done(SET_ID)));
    assert!(session.set().unwrap().done);
}

#[test]
fn unknown_set_and_media_surface_errors() {
    let client = FakeClient::new(reef_set(0), false);
    let opener = SyntheticOpener::new();
    let mut session = ReviewSession::new(test_config(), Box::new(client.clone()), Box::new(opener));
    assert!(matches!(
        session.open_set(99),
        Err(ReviewError::Client(ClientError::QueryFailed { status: 404, .. }))
    ));
    assert!(matches!(session.open_set(SET_ID), Err(ReviewError::Playback(_))));
    assert!(session.model().is_none());
    assert!(matches!(
        session.commit_annotation(AnnotationChoice::OfInterest),
        Err(ReviewError::NoSet)
    ));
}
