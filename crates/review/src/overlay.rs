use annotation::{Extent, Highlighter, Point, Rect};
use media_io::VideoFrame;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
    /// Redrawn from decoded frames while playback runs.
    #[default]
    Live,
    /// One captured frame plus the highlight, while paused.
    Frozen,
}

/// Video surface with the region-of-interest rectangle drawn on top.
///
/// Highlight coordinates are pixels of the displayed image, whose size is
/// `view_size`.
#[derive(Debug, Default)]
pub struct Overlay {
    mode: OverlayMode,
    frame: Option<VideoFrame>,
    view_width: u32,
    view_height: u32,
    highlighter: Highlighter,
    drawing: bool,
    replay: Option<Extent>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    pub fn is_frozen(&self) -> bool {
        self.mode == OverlayMode::Frozen
    }

    /// The captured frame; `None` in live mode.
    pub fn frame(&self) -> Option<&VideoFrame> {
        self.frame.as_ref()
    }

    pub fn view_size(&self) -> (u32, u32) {
        (self.view_width, self.view_height)
    }

    pub fn set_view_size(&mut self, width: u32, height: u32) {
        self.view_width = width;
        self.view_height = height;
    }

    /// Enter (or refresh) frozen mode with a single captured frame. Any
    /// highlight belonged to the previous frame and is dropped.
    pub fn freeze(&mut self, frame: Option<VideoFrame>) {
        if let Some(f) = &frame {
            if self.view_width == 0 || self.view_height == 0 {
                self.set_view_size(f.width, f.height);
            }
            trace!(position = f.position_ms, "overlay frozen");
        }
        self.mode = OverlayMode::Frozen;
        self.frame = frame;
        self.clear_highlight();
    }

    /// Back to live video. Pending highlights are abandoned.
    pub fn go_live(&mut self) {
        self.mode = OverlayMode::Live;
        self.frame = None;
        self.clear_highlight();
    }

    /// Starts a drag. Only possible on a frozen frame.
    pub fn begin_highlight(&mut self, point: Point) -> bool {
        if !self.is_frozen() {
            return false;
        }
        self.replay = None;
        self.highlighter.start(self.clamp_to_view(point));
        self.drawing = true;
        true
    }

    pub fn drag_highlight(&mut self, point: Point) {
        if self.drawing {
            self.highlighter.extend(self.clamp_to_view(point));
        }
    }

    pub fn end_highlight(&mut self, point: Point) {
        if self.drawing {
            self.highlighter.extend(self.clamp_to_view(point));
            self.drawing = false;
        }
    }

    /// Drags leaving the image stop at its edge.
    fn clamp_to_view(&self, point: Point) -> Point {
        if self.view_width == 0 || self.view_height == 0 {
            return point;
        }
        Point::new(
            point.x.clamp(0, self.view_width as i32),
            point.y.clamp(0, self.view_height as i32),
        )
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Show a stored extent, e.g. when an existing event is selected.
    pub fn replay(&mut self, extent: Extent) {
        self.highlighter.clear();
        self.drawing = false;
        self.replay = (!extent.is_empty()).then_some(extent);
    }

    pub fn clear_highlight(&mut self) {
        self.highlighter.clear();
        self.drawing = false;
        self.replay = None;
    }

    /// Rectangle to draw, in view pixels.
    pub fn highlight_rect(&self) -> Option<Rect> {
        if !self.highlighter.is_empty() {
            return Some(self.highlighter.rect());
        }
        let extent = self.replay.as_ref()?;
        let rect = extent.as_rect(self.view_height as f64, self.view_width as f64);
        (!rect.is_empty()).then_some(rect)
    }

    /// Normalized extent of the drawn rectangle, for saving with an event.
    pub fn current_extent(&self) -> Option<Extent> {
        if self.highlighter.is_empty() {
            return self.replay.clone();
        }
        let mut extent = Extent::from_rect(self.highlighter.rect());
        extent.to_text(self.view_height as f64, self.view_width as f64);
        (!extent.is_empty()).then_some(extent)
    }
}
