use crate::{Point, Rect};

/// Two-corner drag gesture over the video frame.
///
/// `start` anchors the gesture, `extend` follows the pointer while the
/// button is held. The rectangle is always canonical, whichever way the
/// user dragged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Highlighter {
    anchor: Point,
    corner: Point,
}

impl Highlighter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, point: Point) {
        self.anchor = point;
        self.corner = point;
    }

    pub fn extend(&mut self, point: Point) {
        self.corner = point;
    }

    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.anchor, self.corner)
    }

    pub fn clear(&mut self) {
        self.anchor = Point::default();
        self.corner = Point::default();
    }

    /// True while no area has been dragged out.
    pub fn is_empty(&self) -> bool {
        self.rect().is_empty()
    }
}
