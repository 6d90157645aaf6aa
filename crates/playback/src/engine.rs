use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use media_io::{MediaOpener, MediaSource, SourceProperties, VideoFrame};

use crate::{Millis, PlayState, PlaybackError, PlaybackEvent, Result, Ticker};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    pub tick_interval: Duration,
    /// Rewind distance per tick in `SeekBack`.
    pub seek_back_step_ms: Millis,
    pub progress_report_ms: Millis,
    /// Spawn the background ticker on load. Headless tests drive `tick()`.
    pub spawn_ticker: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(40),
            seek_back_step_ms: 500,
            progress_report_ms: 30_000,
            spawn_ticker: true,
        }
    }
}

struct Loaded {
    uri: String,
    source: Box<dyn MediaSource>,
    props: SourceProperties,
    length: Millis,
    /// Index the source will deliver on the next `next_frame`.
    next_index: u64,
}

/// Owns the decode handle and the play state.
///
/// All methods run on the caller's thread; the ticker only signals.
pub struct PlaybackEngine {
    config: PlaybackConfig,
    media: Option<Loaded>,
    state: PlayState,
    speed: f64,
    position: Millis,
    current: Option<VideoFrame>,
    snapshot: Option<VideoFrame>,
    /// Sub-millisecond carry between ticks.
    budget_ms: f64,
    since_progress: Millis,
    ticker: Option<Ticker>,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl PlaybackEngine {
    pub fn new(config: PlaybackConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            media: None,
            state: PlayState::NotReady,
            speed: 1.0,
            position: 0,
            current: None,
            snapshot: None,
            budget_ms: 0.0,
            since_progress: 0,
            ticker: None,
            events_tx,
            events_rx,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    pub fn load(&mut self, uri: &str, opener: &dyn MediaOpener) -> Result<()> {
        self.unload();
        let mut source = match opener.open(uri) {
            Ok(s) => s,
            Err(e) => {
                error!(uri, "failed to open media: {e}");
                return Err(e.into());
            }
        };
        let props = source.properties();
        let length = length_of(&props);
        source.seek(0)?;
        let first = source.next_frame()?;
        info!(
            uri,
            width = props.width,
            height = props.height,
            fps = props.frame_rate,
            length_ms = length,
            "media loaded"
        );

        self.media = Some(Loaded {
            uri: uri.to_string(),
            source,
            props,
            length,
            next_index: u64::from(first.is_some()),
        });
        self.snapshot = first.clone();
        self.current = first;
        self.position = 0;
        self.speed = 1.0;
        self.budget_ms = 0.0;
        self.since_progress = 0;
        self.set_state(PlayState::Paused);
        self.emit(PlaybackEvent::PositionChanged(0));
        if self.config.spawn_ticker {
            self.ticker = Some(Ticker::start(self.config.tick_interval));
        }
        Ok(())
    }

    pub fn unload(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        if let Some(media) = self.media.take() {
            debug!(uri = %media.uri, "media unloaded");
        }
        self.current = None;
        self.snapshot = None;
        self.state = PlayState::NotReady;
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn properties(&self) -> Option<SourceProperties> {
        self.media.as_ref().map(|m| m.props)
    }

    pub fn get_position(&self) -> Millis {
        self.position
    }

    /// Frame count / frame rate in ms; 0 when either is unknown.
    pub fn get_length(&self) -> Millis {
        self.media.as_ref().map_or(0, |m| m.length)
    }

    /// Most recently decoded frame.
    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    /// Frame captured when playback last paused.
    pub fn snapshot(&self) -> Option<&VideoFrame> {
        self.snapshot.as_ref()
    }

    pub fn play(&mut self) -> Result<()> {
        if self.media.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        if self.state == PlayState::Playing {
            return Ok(());
        }
        if self.state == PlayState::EndOfStream {
            self.seek_source(0)?;
            self.position = 0;
            self.since_progress = 0;
            self.emit(PlaybackEvent::PositionChanged(0));
        }
        self.apply_speed(1.0);
        self.budget_ms = 0.0;
        self.snapshot = None;
        self.set_state(PlayState::Playing);
        Ok(())
    }

    /// Ended streams stay ended so the next `play()` restarts from 0.
    pub fn pause(&mut self) {
        if matches!(
            self.state,
            PlayState::Paused | PlayState::NotReady | PlayState::EndOfStream
        ) {
            return;
        }
        self.snapshot = self.current.clone();
        self.set_state(PlayState::Paused);
        self.emit(PlaybackEvent::SpeedChanged(0.0));
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        match self.state {
            PlayState::Paused | PlayState::EndOfStream => self.play(),
            PlayState::NotReady => Err(PlaybackError::NotLoaded),
            _ => {
                self.pause();
                Ok(())
            }
        }
    }

    /// Seek, decode the frame there and pause. Saturates to `[0, length)`.
    pub fn set_position(&mut self, position: Millis) -> Result<()> {
        let target = self.seek_to(position)?;
        info!(requested = position, position = target, "seek");
        Ok(())
    }

    /// Same as `set_position`, used while a drag is in progress.
    pub fn scrub_position(&mut self, position: Millis) -> Result<()> {
        let target = self.seek_to(position)?;
        debug!(position = target, "scrub");
        Ok(())
    }

    /// Any rate other than 1.0 plays as `SeekForward`. Resumes when paused.
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlaybackError::InvalidSpeed(speed));
        }
        if self.media.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        self.apply_speed(speed);
        if self.state == PlayState::EndOfStream {
            return Ok(());
        }
        self.snapshot = None;
        self.budget_ms = 0.0;
        let next = if speed == 1.0 {
            PlayState::Playing
        } else {
            PlayState::SeekForward
        };
        self.set_state(next);
        Ok(())
    }

    /// Rewind by `seek_back_step_ms` per tick until position 0.
    pub fn seek_back(&mut self) -> Result<()> {
        if self.media.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        self.snapshot = None;
        self.set_state(PlayState::SeekBack);
        Ok(())
    }

    /// Handle a pending tick from the ticker. Returns true if one was handled.
    pub fn poll(&mut self) -> bool {
        let ticked = self.ticker.as_ref().is_some_and(|t| t.try_tick());
        if ticked {
            self.tick();
        }
        ticked
    }

    pub fn tick(&mut self) {
        match self.state {
            PlayState::Playing | PlayState::SeekForward => self.advance(),
            PlayState::SeekBack => self.rewind(),
            PlayState::NotReady | PlayState::Paused | PlayState::EndOfStream => {}
        }
    }

    fn advance(&mut self) {
        let Some(media) = self.media.as_mut() else {
            return;
        };
        let interval = self.config.tick_interval.as_millis() as f64;
        self.budget_ms += interval * self.speed;
        let whole = self.budget_ms.floor();
        self.budget_ms -= whole;
        let target = self.position + whole as Millis;
        let target_index = media.props.frame_index_at(target);

        while media.next_index <= target_index {
            match media.source.next_frame() {
                Ok(Some(frame)) => {
                    media.next_index += 1;
                    self.current = Some(frame);
                }
                Ok(None) => {
                    debug!(position = self.position, "stream exhausted");
                    self.finish_stream();
                    return;
                }
                Err(e) => {
                    error!(position = self.position, "decode failed: {e}");
                    self.finish_stream();
                    return;
                }
            }
        }

        let length = media.length;
        let previous = self.position;
        self.position = if length > 0 { target.min(length) } else { target };
        self.emit(PlaybackEvent::PositionChanged(self.position));
        self.track_progress(self.position - previous);
        if length > 0 && self.position >= length {
            self.finish_stream();
        }
    }

    fn rewind(&mut self) {
        let target = (self.position - self.config.seek_back_step_ms).max(0);
        match self.seek_source(target) {
            Ok(()) => {
                self.position = target;
                self.emit(PlaybackEvent::PositionChanged(target));
                if target == 0 {
                    self.snapshot = self.current.clone();
                    self.set_state(PlayState::Paused);
                }
            }
            Err(e) => {
                error!(target, "rewind failed: {e}");
                self.finish_stream();
            }
        }
    }

    fn finish_stream(&mut self) {
        self.budget_ms = 0.0;
        self.set_state(PlayState::EndOfStream);
    }

    fn track_progress(&mut self, advanced: Millis) {
        let step = self.config.progress_report_ms;
        if step <= 0 || advanced <= 0 {
            return;
        }
        self.since_progress += advanced;
        if self.since_progress >= step {
            self.since_progress %= step;
            self.emit(PlaybackEvent::ProgressUpdate(self.position));
        }
    }

    fn seek_to(&mut self, position: Millis) -> Result<Millis> {
        let length = self.get_length();
        if self.media.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        let target = if length > 0 {
            position.clamp(0, length - 1)
        } else {
            position.max(0)
        };
        self.seek_source(target)?;
        self.position = target;
        self.budget_ms = 0.0;
        self.snapshot = self.current.clone();
        self.set_state(PlayState::Paused);
        self.emit(PlaybackEvent::PositionChanged(target));
        Ok(target)
    }

    /// Seeks the source and decodes the frame at `position`.
    fn seek_source(&mut self, position: Millis) -> Result<()> {
        let media = self.media.as_mut().ok_or(PlaybackError::NotLoaded)?;
        media.source.seek(position)?;
        let last = media.props.frame_count.saturating_sub(1);
        let index = media.props.frame_index_at(position).min(last);
        match media.source.next_frame()? {
            Some(frame) => {
                media.next_index = index + 1;
                self.current = Some(frame);
            }
            None => {
                warn!(position, "no frame at seek target");
                media.next_index = index;
            }
        }
        Ok(())
    }

    fn apply_speed(&mut self, speed: f64) {
        if let Some(media) = self.media.as_mut() {
            media.source.set_rate(speed);
        }
        if self.speed != speed || self.state == PlayState::Paused {
            self.speed = speed;
            self.emit(PlaybackEvent::SpeedChanged(speed));
        }
    }

    fn set_state(&mut self, state: PlayState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "play state");
        self.state = state;
        self.emit(PlaybackEvent::StateChanged(state));
    }

    fn emit(&self, event: PlaybackEvent) {
        // The engine holds a receiver, so sending cannot fail.
        let _ = self.events_tx.send(event);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.unload();
    }
}

fn length_of(props: &SourceProperties) -> Millis {
    if props.frame_count == 0 || props.frame_rate <= 0.0 {
        error!(
            frames = props.frame_count,
            fps = props.frame_rate,
            "cannot compute media length"
        );
        return 0;
    }
    (props.frame_count as f64 * 1000.0 / props.frame_rate).round() as Millis
}
