//! Seek bar: position indicator, observation tick marks, drag handling and
//! the progress gate for non-lead reviewers.

use annotation::timecode::format_millis;
use annotation::{Millis, ObservationKey};
use tracing::trace;

/// Pointer distance (px) within which a click selects a tick.
const TICK_HIT_PX: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub key: ObservationKey,
    pub position: Millis,
    pub x: i32,
}

/// What the caller should do with a pointer gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekAction {
    None,
    /// Move the indicator only; playback is untouched.
    Preview(Millis),
    /// Commit a seek.
    Seek(Millis),
    /// A tick was clicked.
    Select { key: ObservationKey, position: Millis },
}

#[derive(Debug, Clone)]
pub struct SeekControl {
    width: i32,
    length: Millis,
    position: Millis,
    markers: Vec<(ObservationKey, Millis)>,
    ticks: Vec<Tick>,
    dragging: bool,
    preview: Option<Millis>,
    tooltip: Option<String>,
    click_to_seek: bool,
    /// Progress watermark; `None` when the user may seek anywhere.
    gate: Option<Millis>,
}

impl SeekControl {
    pub fn new(width: i32, click_to_seek: bool) -> Self {
        Self {
            width: width.max(0),
            length: 0,
            position: 0,
            markers: Vec::new(),
            ticks: Vec::new(),
            dragging: false,
            preview: None,
            tooltip: None,
            click_to_seek,
            gate: None,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn length(&self) -> Millis {
        self.length
    }

    pub fn position(&self) -> Millis {
        self.position
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn preview(&self) -> Option<Millis> {
        self.preview
    }

    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn gate(&self) -> Option<Millis> {
        self.gate
    }

    pub fn set_width(&mut self, width: i32) {
        let width = width.max(0);
        if width != self.width {
            self.width = width;
            self.regenerate();
        }
    }

    pub fn set_length(&mut self, length: Millis) {
        self.length = length.max(0);
        self.regenerate();
    }

    /// One marker per observation, at its initial time.
    pub fn set_markers(&mut self, markers: Vec<(ObservationKey, Millis)>) {
        self.markers = markers;
        self.regenerate();
    }

    pub fn set_gate(&mut self, gate: Option<Millis>) {
        self.gate = gate;
    }

    /// Indicator update from playback. Ignored while the user drags.
    pub fn set_position(&mut self, position: Millis) {
        if !self.dragging {
            self.position = position;
        }
    }

    pub fn x_to_position(&self, x: i32) -> Millis {
        if self.width == 0 {
            return 0;
        }
        let x = x.clamp(0, self.width) as i64;
        x * self.length / self.width as i64
    }

    pub fn position_to_x(&self, position: Millis) -> i32 {
        if self.length == 0 {
            return 0;
        }
        let p = position.clamp(0, self.length);
        (p * self.width as i64 / self.length) as i32
    }

    /// Bounds a seek target to `[0, length]` and the progress gate.
    pub fn clamp(&self, position: Millis) -> Millis {
        let mut p = position.max(0);
        if self.length > 0 {
            p = p.min(self.length);
        }
        if let Some(gate) = self.gate {
            p = p.min(gate.max(0));
        }
        p
    }

    pub fn tick_at(&self, x: i32) -> Option<&Tick> {
        self.ticks
            .iter()
            .filter(|t| (t.x - x).abs() <= TICK_HIT_PX)
            .min_by_key(|t| (t.x - x).abs())
    }

    pub fn pointer_down(&mut self, x: i32) -> SeekAction {
        if let Some(tick) = self.tick_at(x) {
            let (key, position) = (tick.key, self.clamp(tick.position));
            self.position = position;
            return SeekAction::Select { key, position };
        }
        self.dragging = true;
        let position = self.track(x);
        SeekAction::Seek(position)
    }

    pub fn pointer_move(&mut self, x: i32) -> SeekAction {
        if !self.dragging {
            return SeekAction::None;
        }
        let position = self.track(x);
        if self.click_to_seek {
            SeekAction::Seek(position)
        } else {
            SeekAction::Preview(position)
        }
    }

    pub fn pointer_up(&mut self, x: i32) -> SeekAction {
        if !self.dragging {
            return SeekAction::None;
        }
        let position = self.track(x);
        self.dragging = false;
        self.preview = None;
        self.tooltip = None;
        SeekAction::Seek(position)
    }

    fn track(&mut self, x: i32) -> Millis {
        let position = self.clamp(self.x_to_position(x));
        self.position = position;
        self.preview = Some(position);
        self.tooltip = Some(format_millis(position));
        position
    }

    fn regenerate(&mut self) {
        let ticks = self
            .markers
            .iter()
            .map(|&(key, position)| Tick {
                key,
                position,
                x: self.position_to_x(position),
            })
            .collect();
        self.ticks = ticks;
        trace!(ticks = self.ticks.len(), width = self.width, "seek ticks regenerated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> SeekControl {
        let mut c = SeekControl::new(1000, false);
        c.set_length(10_000);
        c
    }

    #[test]
    fn ticks_follow_width_and_markers() {
        let mut c = control();
        let key = ObservationKey::new();
        c.set_markers(vec![(key, 2500)]);
        assert_eq!(c.ticks()[0].x, 250);
        c.set_width(400);
        assert_eq!(c.ticks()[0].x, 100);
        c.set_markers(Vec::new());
        assert!(c.ticks().is_empty());
    }

    #[test]
    fn drag_previews_then_commits_on_release() {
        let mut c = control();
        assert_eq!(c.pointer_down(100), SeekAction::Seek(1000));
        assert_eq!(c.pointer_move(300), SeekAction::Preview(3000));
        assert_eq!(c.tooltip(), Some("00:00:03.000"));
        c.set_position(9999);
        assert_eq!(c.position(), 3000);
        assert_eq!(c.pointer_up(350), SeekAction::Seek(3500));
        assert!(!c.is_dragging());
        assert_eq!(c.tooltip(), None);
        assert_eq!(c.pointer_move(600), SeekAction::None);
    }

    #[test]
    fn click_to_seek_commits_every_move() {
        let mut c = SeekControl::new(100, true);
        c.set_length(1000);
        c.pointer_down(10);
        assert_eq!(c.pointer_move(20), SeekAction::Seek(200));
    }

    #[test]
    fn gate_clamps_seeks() {
        let mut c = control();
        c.set_gate(Some(5000));
        assert_eq!(c.pointer_down(800), SeekAction::Seek(5000));
        assert_eq!(c.pointer_up(900), SeekAction::Seek(5000));
        c.set_gate(None);
        assert_eq!(c.pointer_down(800), SeekAction::Seek(8000));
    }

    #[test]
    fn tick_click_selects_observation() {
        let mut c = control();
        let key = ObservationKey::new();
        c.set_markers(vec![(key, 1000)]);
        assert_eq!(
            c.pointer_down(102),
            SeekAction::Select { key, position: 1000 }
        );
        assert!(!c.is_dragging());
    }

    #[test]
    fn out_of_range_pointer_saturates() {
        let mut c = control();
        assert_eq!(c.pointer_down(-40), SeekAction::Seek(0));
        assert_eq!(c.pointer_up(5000), SeekAction::Seek(10_000));
    }
}
