use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use annotation::timecode::Timecode;
use annotation::{AnnotationError, Event, Millis, Observation, ObservationKey, Point, ReviewSet};
use media_io::MediaOpener;
use playback::{PlayState, PlaybackEngine, PlaybackEvent};
use review_client::{ObservationPatch, ReviewClient, UserProfile};

use crate::config::ReviewConfig;
use crate::input::{Command, Key, KeyMap, Modifiers};
use crate::menu::{menu_choices, AnnotationChoice};
use crate::overlay::Overlay;
use crate::seek::{SeekAction, SeekControl};
use crate::timeline_model::{Column, ObservationModel};
use crate::{ReviewError, Result};

const DEFAULT_SEEK_WIDTH: i32 = 1000;
const FAST_FORWARD_SPEED: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Playback(PlaybackEvent),
    SetLoaded { set_id: i64, observations: usize },
    TickSelected { key: ObservationKey, event_index: usize },
    GoToObservation { key: ObservationKey, position: Millis },
    ObservationAdded(ObservationKey),
    ObservationUpdated(ObservationKey),
    ObservationRemoved(ObservationKey),
    ProgressSaved(Millis),
    SetFinished(i64),
}

/// One reviewer working through one set at a time.
///
/// Runs entirely on the UI thread: call [`ReviewSession::poll`] from the
/// event loop to consume playback ticks.
pub struct ReviewSession {
    config: ReviewConfig,
    client: Box<dyn ReviewClient>,
    opener: Box<dyn MediaOpener>,
    user: Option<UserProfile>,
    engine: PlaybackEngine,
    playback_rx: Receiver<PlaybackEvent>,
    seek: SeekControl,
    overlay: Overlay,
    keymap: KeyMap,
    /// Set metadata. Its observations live in `model`.
    set: Option<ReviewSet>,
    model: Option<ObservationModel>,
    selected: Option<(ObservationKey, usize)>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl ReviewSession {
    pub fn new(
        config: ReviewConfig,
        client: Box<dyn ReviewClient>,
        opener: Box<dyn MediaOpener>,
    ) -> Self {
        let engine = PlaybackEngine::new(config.playback());
        let playback_rx = engine.events();
        let seek = SeekControl::new(DEFAULT_SEEK_WIDTH, config.click_to_seek);
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            client,
            opener,
            user: None,
            engine,
            playback_rx,
            seek,
            overlay: Overlay::new(),
            keymap: KeyMap::default(),
            set: None,
            model: None,
            selected: None,
            events_tx,
            events_rx,
        }
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_lead(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_lead)
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn seek(&self) -> &SeekControl {
        &self.seek
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn model(&self) -> Option<&ObservationModel> {
        self.model.as_ref()
    }

    pub fn set(&self) -> Option<&ReviewSet> {
        self.set.as_ref()
    }

    pub fn selected(&self) -> Option<(ObservationKey, usize)> {
        self.selected
    }

    pub fn keymap_mut(&mut self) -> &mut KeyMap {
        &mut self.keymap
    }

    pub fn position(&self) -> Millis {
        self.engine.get_position()
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<UserProfile> {
        let profile = self.client.login(username, password)?;
        info!(user = %profile.username, lead = profile.is_lead, "session user");
        self.user = Some(profile.clone());
        self.seek.set_gate(self.gate());
        Ok(profile)
    }

    /// Fetch a set, locate and load its video, and rebuild the seek ticks
    /// and table. The previous set is discarded.
    pub fn open_set(&mut self, set_id: i64) -> Result<()> {
        let mut set = self.client.set_detail(set_id)?;
        set.resolve();
        let uri = self.media_uri(&set.video_file);
        self.set = None;
        self.model = None;
        self.selected = None;
        self.engine.load(&uri, self.opener.as_ref())?;

        let model = ObservationModel::from_set(&set, self.is_lead());
        set.observations.clear();
        self.seek.set_length(self.engine.get_length());
        self.seek.set_markers(model.markers());
        self.seek.set_position(0);
        info!(
            set_id,
            name = %set.name,
            observations = model.len(),
            progress = set.progress,
            "set opened"
        );
        let observations = model.len();
        self.set = Some(set);
        self.model = Some(model);
        self.seek.set_gate(self.gate());
        self.process_playback_events();
        self.emit(SessionEvent::SetLoaded {
            set_id,
            observations,
        });
        Ok(())
    }

    fn media_uri(&self, video_file: &str) -> String {
        self.config
            .find_media(video_file)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| video_file.to_string())
    }

    /// Seek limit for the current user; leads are not gated.
    fn gate(&self) -> Option<Millis> {
        if self.is_lead() {
            return None;
        }
        self.set.as_ref().map(|s| s.progress)
    }

    // Playback

    pub fn play(&mut self) -> Result<()> {
        self.engine.play()?;
        self.process_playback_events();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.engine.pause();
        self.process_playback_events();
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        self.engine.toggle_play()?;
        self.process_playback_events();
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.engine.set_speed(speed)?;
        self.process_playback_events();
        Ok(())
    }

    pub fn seek_back(&mut self) -> Result<()> {
        self.engine.seek_back()?;
        self.process_playback_events();
        Ok(())
    }

    /// Seek within the gate. Returns the position reached.
    pub fn seek_to(&mut self, position: Millis) -> Result<Millis> {
        let target = self.seek.clamp(position);
        self.engine.set_position(target)?;
        self.process_playback_events();
        Ok(self.engine.get_position())
    }

    /// Consume a pending tick from the ticker thread.
    pub fn poll(&mut self) -> bool {
        let before = self.engine.state();
        let ticked = self.engine.poll();
        if ticked {
            self.after_tick(before);
        }
        self.process_playback_events();
        ticked
    }

    /// Run one tick synchronously.
    pub fn tick(&mut self) {
        let before = self.engine.state();
        self.engine.tick();
        self.after_tick(before);
        self.process_playback_events();
    }

    fn after_tick(&mut self, before: PlayState) {
        if !matches!(before, PlayState::Playing | PlayState::SeekForward) {
            return;
        }
        let position = self.engine.get_position();
        if let Some(set) = self.set.as_mut() {
            set.advance_progress(position);
        }
        self.seek.set_gate(self.gate());
    }

    fn process_playback_events(&mut self) {
        let events: Vec<PlaybackEvent> = self.playback_rx.try_iter().collect();
        let mut moved = false;
        for event in events {
            match event {
                PlaybackEvent::PositionChanged(p) => {
                    self.seek.set_position(p);
                    moved = true;
                }
                PlaybackEvent::StateChanged(_) => moved = true,
                PlaybackEvent::ProgressUpdate(p) => self.record_progress(p),
                PlaybackEvent::SpeedChanged(_) => {}
            }
            self.emit(SessionEvent::Playback(event));
        }
        if moved {
            self.sync_overlay();
        }
    }

    /// Frozen while paused or ended, live otherwise.
    fn sync_overlay(&mut self) {
        match self.engine.state() {
            PlayState::Paused | PlayState::EndOfStream => {
                let frame = self
                    .engine
                    .snapshot()
                    .or(self.engine.current_frame())
                    .cloned();
                self.overlay.freeze(frame);
            }
            PlayState::NotReady => self.overlay.go_live(),
            _ => {
                if self.overlay.is_frozen() {
                    self.overlay.go_live();
                    self.selected = None;
                }
            }
        }
    }

    fn record_progress(&mut self, position: Millis) {
        let Some(set) = self.set.as_mut() else {
            return;
        };
        set.advance_progress(position);
        let (set_id, progress) = (set.id, set.progress);
        self.seek.set_gate(self.gate());
        match self.client.update_progress(set_id, progress) {
            Ok(()) => {
                debug!(set_id, progress, "progress saved");
                self.emit(SessionEvent::ProgressSaved(progress));
            }
            Err(e) => warn!(set_id, progress, "progress update failed: {e}"),
        }
    }

    // Seek bar

    pub fn set_seek_width(&mut self, width: i32) {
        self.seek.set_width(width);
    }

    pub fn seek_pointer_down(&mut self, x: i32) -> Result<()> {
        let action = self.seek.pointer_down(x);
        self.apply_seek_action(action)
    }

    pub fn seek_pointer_move(&mut self, x: i32) -> Result<()> {
        let action = self.seek.pointer_move(x);
        self.apply_seek_action(action)
    }

    pub fn seek_pointer_up(&mut self, x: i32) -> Result<()> {
        let action = self.seek.pointer_up(x);
        self.apply_seek_action(action)
    }

    fn apply_seek_action(&mut self, action: SeekAction) -> Result<()> {
        match action {
            SeekAction::None | SeekAction::Preview(_) => Ok(()),
            SeekAction::Seek(position) => {
                self.engine.pause();
                if self.seek.is_dragging() {
                    self.engine.scrub_position(position)?;
                } else {
                    self.engine.set_position(position)?;
                }
                self.process_playback_events();
                Ok(())
            }
            SeekAction::Select { key, .. } => self.select_observation(key, 0),
        }
    }

    /// Seek to one of an observation's events and show its extent. Events
    /// past the reviewer's watermark are not reachable: the seek stops at the
    /// watermark and nothing is selected.
    pub fn select_observation(&mut self, key: ObservationKey, event_index: usize) -> Result<()> {
        let (time, extent) = {
            let model = self.model.as_ref().ok_or(ReviewError::NoSet)?;
            let obs = model.get(key).ok_or(ReviewError::UnknownObservation)?;
            let event = obs
                .events()
                .get(event_index)
                .ok_or(ReviewError::UnknownObservation)?;
            (event.event_time, event.extent.clone())
        };
        let target = self.seek.clamp(time);
        self.engine.set_position(target)?;
        self.process_playback_events();
        if target != time {
            debug!(?key, event_time = time, position = target, "event beyond progress");
            self.selected = None;
            return Ok(());
        }
        self.overlay.replay(extent);
        self.selected = Some((key, event_index));
        debug!(?key, event_index, position = target, "observation selected");
        self.emit(SessionEvent::TickSelected { key, event_index });
        Ok(())
    }

    pub fn next_observation(&mut self) -> Result<Option<ObservationKey>> {
        let position = self.position();
        let next = self
            .model
            .as_ref()
            .ok_or(ReviewError::NoSet)?
            .next_after(position);
        self.go_to(next)
    }

    pub fn prev_observation(&mut self) -> Result<Option<ObservationKey>> {
        let position = self.position();
        let prev = self
            .model
            .as_ref()
            .ok_or(ReviewError::NoSet)?
            .prev_before(position);
        self.go_to(prev)
    }

    fn go_to(&mut self, target: Option<(ObservationKey, Millis)>) -> Result<Option<ObservationKey>> {
        let Some((key, _)) = target else {
            return Ok(None);
        };
        self.select_observation(key, 0)?;
        self.emit(SessionEvent::GoToObservation {
            key,
            position: self.position(),
        });
        Ok(Some(key))
    }

    // Highlight

    pub fn set_view_size(&mut self, width: u32, height: u32) {
        self.overlay.set_view_size(width, height);
    }

    pub fn begin_highlight(&mut self, point: Point) -> bool {
        self.overlay.begin_highlight(point)
    }

    pub fn drag_highlight(&mut self, point: Point) {
        self.overlay.drag_highlight(point);
    }

    pub fn end_highlight(&mut self, point: Point) {
        self.overlay.end_highlight(point);
    }

    pub fn clear_highlight(&mut self) {
        self.overlay.clear_highlight();
        self.selected = None;
    }

    // Observations

    pub fn annotation_choices(&self) -> Vec<AnnotationChoice> {
        match &self.model {
            Some(model) => menu_choices(model.organisms(), model.observations(), self.position()),
            None => Vec::new(),
        }
    }

    /// Record an event at the current position with the drawn extent.
    pub fn commit_annotation(&mut self, choice: AnnotationChoice) -> Result<ObservationKey> {
        let position = self.engine.get_position();
        let extent = self.overlay.current_extent().unwrap_or_default();
        let event = Event::new(position).with_extent(extent);

        let model = self.model.as_mut().ok_or(ReviewError::NoSet)?;
        let client = self.client.as_ref();
        let (key, added) = match choice {
            AnnotationChoice::Organism(organism) => {
                (model.add(client, Observation::animal(&organism, event))?, true)
            }
            AnnotationChoice::OfInterest => (model.add(client, Observation::interest(event))?, true),
            AnnotationChoice::Existing(key) => {
                model.append_event(client, key, event)?;
                (key, false)
            }
        };
        self.seek.set_markers(model.markers());
        self.overlay.clear_highlight();
        info!(?key, position, added, "annotation committed");
        self.emit(if added {
            SessionEvent::ObservationAdded(key)
        } else {
            SessionEvent::ObservationUpdated(key)
        });
        Ok(key)
    }

    /// Duration from the observation's start to the current position.
    pub fn set_duration(&mut self, key: ObservationKey) -> Result<Millis> {
        let position = self.engine.get_position();
        let model = self.model.as_mut().ok_or(ReviewError::NoSet)?;
        let duration = model.set_duration(self.client.as_ref(), key, position)?;
        self.emit(SessionEvent::ObservationUpdated(key));
        Ok(duration)
    }

    pub fn edit_comment(&mut self, key: ObservationKey, comment: &str) -> Result<()> {
        self.edit(key, ObservationPatch::comment(comment))
    }

    pub fn change_organism(&mut self, key: ObservationKey, organism_id: i64) -> Result<()> {
        let known = self
            .model
            .as_ref()
            .ok_or(ReviewError::NoSet)?
            .organisms()
            .iter()
            .any(|o| o.id == organism_id);
        if !known {
            return Err(AnnotationError::UnknownOrganism(organism_id).into());
        }
        self.edit(key, ObservationPatch::organism(organism_id))
    }

    fn edit(&mut self, key: ObservationKey, patch: ObservationPatch) -> Result<()> {
        let model = self.model.as_mut().ok_or(ReviewError::NoSet)?;
        model.edit(self.client.as_ref(), key, &patch)?;
        self.seek.set_markers(model.markers());
        self.emit(SessionEvent::ObservationUpdated(key));
        Ok(())
    }

    pub fn remove_observation(&mut self, key: ObservationKey) -> Result<()> {
        let model = self.model.as_mut().ok_or(ReviewError::NoSet)?;
        model.remove(self.client.as_ref(), key)?;
        self.seek.set_markers(model.markers());
        if self.selected.is_some_and(|(k, _)| k == key) {
            self.clear_highlight();
        }
        self.emit(SessionEvent::ObservationRemoved(key));
        Ok(())
    }

    /// Table edit callback. Returns false when the edit was ignored, either
    /// because it came from a programmatic update or the cell is read-only.
    pub fn edit_cell(&mut self, key: ObservationKey, column: Column, text: &str) -> Result<bool> {
        let model = self.model.as_ref().ok_or(ReviewError::NoSet)?;
        if model.table().is_suppressed() {
            debug!(?column, "ignoring programmatic cell change");
            return Ok(false);
        }
        match column {
            Column::Comment => self.edit_comment(key, text)?,
            Column::Duration => {
                if !self.is_lead() {
                    return Err(ReviewError::NotPermitted("edit durations"));
                }
                let duration = Timecode::parse(text)?.to_millis();
                if duration <= 0 {
                    return Err(AnnotationError::NonPositiveDuration(duration).into());
                }
                self.edit(key, ObservationPatch::duration(duration))?;
            }
            Column::Label | Column::Time | Column::Events => return Ok(false),
        }
        Ok(true)
    }

    pub fn finish_set(&mut self) -> Result<()> {
        let set = self.set.as_mut().ok_or(ReviewError::NoSet)?;
        self.client.mark_set_done(set.id)?;
        set.done = true;
        let set_id = set.id;
        info!(set_id, "set marked done");
        self.emit(SessionEvent::SetFinished(set_id));
        Ok(())
    }

    // Keyboard

    pub fn handle_key(&mut self, modifiers: Modifiers, key: Key) -> Result<Option<Command>> {
        let Some(command) = self.keymap.lookup(modifiers, key) else {
            return Ok(None);
        };
        debug!(?command, "key command");
        let step = self.config.step_ms;
        match command {
            Command::TogglePlay => self.toggle_play()?,
            Command::StepBackward => {
                self.seek_to(self.position() - step)?;
            }
            Command::StepForward => {
                self.seek_to(self.position() + step)?;
            }
            Command::FastForward => self.set_speed(FAST_FORWARD_SPEED)?,
            Command::Rewind => self.seek_back()?,
            Command::CommitAnnotation => {
                let choice = match self.selected {
                    Some((key, _)) => AnnotationChoice::Existing(key),
                    None => AnnotationChoice::OfInterest,
                };
                self.commit_annotation(choice)?;
            }
            Command::ClearHighlight => self.clear_highlight(),
            Command::NextObservation => {
                self.next_observation()?;
            }
            Command::PrevObservation => {
                self.prev_observation()?;
            }
        }
        Ok(Some(command))
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}
