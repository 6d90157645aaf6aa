//! Region of interest persisted as a normalized polygon.
//!
//! Text form: `POLYGON ((x1 y1, x2 y1, x2 y2, x1 y2, x1 y1))` with every
//! coordinate in [0, 1]. Input may carry a spatial-reference prefix such as
//! `SRID=4326;`, output never does.
use crate::{AnnotationError, Rect};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

const POLYGON_POINTS: usize = 5;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("static regex")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub struct Extent {
    empty: bool,
    /// Pixel rectangle the user drew, source for `to_text`.
    rect: Rect,
    /// Normalized (x, y) pairs, closed ring.
    polygon: [[f64; 2]; POLYGON_POINTS],
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            empty: true,
            rect: Rect::default(),
            polygon: [[0.0; 2]; POLYGON_POINTS],
        }
    }
}

impl Extent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extent holding a live pixel rectangle, not yet normalized.
    pub fn from_rect(rect: Rect) -> Self {
        let mut extent = Self::default();
        extent.set_rect(rect);
        extent
    }

    /// Strict parse; the lenient form is [`Extent::from_text`].
    pub fn parse(text: &str) -> Result<Self, AnnotationError> {
        let body = match text.find(';') {
            Some(idx) => &text[idx + 1..],
            None => text,
        };
        let numbers: Vec<f64> = number_re()
            .find_iter(body)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .collect();
        if numbers.len() < POLYGON_POINTS * 2 {
            return Err(AnnotationError::MalformedExtent(format!(
                "expected {} numbers, found {}",
                POLYGON_POINTS * 2,
                numbers.len()
            )));
        }
        let mut polygon = [[0.0; 2]; POLYGON_POINTS];
        for (i, pair) in numbers.chunks_exact(2).take(POLYGON_POINTS).enumerate() {
            polygon[i] = [pair[0], pair[1]];
        }
        Ok(Self {
            empty: false,
            rect: Rect::default(),
            polygon,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    pub fn polygon(&self) -> &[[f64; 2]; POLYGON_POINTS] {
        &self.polygon
    }

    /// Normalize the current pixel rectangle against a `height` x `width`
    /// viewport and return the polygon text.
    ///
    /// A non-positive reference size leaves the extent empty and returns an
    /// empty string.
    pub fn to_text(&mut self, height: f64, width: f64) -> String {
        if height <= 0.0 || width <= 0.0 {
            debug!(height, width, "extent: degenerate reference size");
            self.empty = true;
            return String::new();
        }
        let x1 = self.rect.left() as f64 / width;
        let y1 = self.rect.top() as f64 / height;
        let x2 = self.rect.right() as f64 / width;
        let y2 = self.rect.bottom() as f64 / height;
        self.polygon = [[x1, y1], [x2, y1], [x2, y2], [x1, y2], [x1, y1]];
        self.empty = false;
        self.polygon_text()
    }

    /// Load from persisted text. Malformed input marks the extent empty.
    pub fn from_text(&mut self, text: &str) {
        match Self::parse(text) {
            Ok(parsed) => *self = parsed,
            Err(err) => {
                debug!(%err, "extent: unusable polygon text");
                self.empty = true;
            }
        }
    }

    /// Denormalize into a pixel rectangle for a `height` x `width` viewport.
    pub fn as_rect(&self, height: f64, width: f64) -> Rect {
        if self.empty {
            return Rect::default();
        }
        let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
        let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
        for [x, y] in self.polygon {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let left = (min_x * width).round() as i32;
        let top = (min_y * height).round() as i32;
        let right = (max_x * width).round() as i32;
        let bottom = (max_y * height).round() as i32;
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Text of the stored normalized polygon (no reference size needed).
    pub fn polygon_text(&self) -> String {
        let ring = self
            .polygon
            .iter()
            .map(|[x, y]| format!("{x} {y}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON (({ring}))")
    }
}

impl From<Option<String>> for Extent {
    fn from(text: Option<String>) -> Self {
        let mut extent = Extent::new();
        if let Some(text) = text {
            extent.from_text(&text);
        }
        extent
    }
}

impl From<Extent> for Option<String> {
    fn from(extent: Extent) -> Self {
        if extent.is_empty() {
            None
        } else {
            Some(extent.polygon_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_text_normalizes_corners() {
        let mut e = Extent::from_rect(Rect::new(100, 50, 200, 100));
        let text = e.to_text(500.0, 1000.0);
        assert_eq!(
            text,
            "POLYGON ((0.1 0.1, 0.3 0.1, 0.3 0.3, 0.1 0.3, 0.1 0.1))"
        );
        assert!(!e.is_empty());
    }

    #[test]
    fn round_trip_within_one_pixel() {
        let sizes = [(480.0, 640.0), (1080.0, 1920.0), (333.0, 517.0)];
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(13, 27, 101, 77),
            Rect::new(200, 150, 111, 99),
        ];
        for (h, w) in sizes {
            for r in rects {
                let mut e = Extent::from_rect(r);
                let text = e.to_text(h, w);
                let mut loaded = Extent::new();
                loaded.from_text(&text);
                let back = loaded.as_rect(h, w);
                assert!((back.x - r.x).abs() <= 1, "{r:?} -> {back:?}");
                assert!((back.y - r.y).abs() <= 1, "{r:?} -> {back:?}");
                assert!((back.width - r.width).abs() <= 1, "{r:?} -> {back:?}");
                assert!((back.height - r.height).abs() <= 1, "{r:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn tolerates_srid_prefix() {
        let mut e = Extent::new();
        e.from_text("SRID=4326;POLYGON ((0.25 0.5, 0.75 0.5, 0.75 1, 0.25 1, 0.25 0.5))");
        assert!(!e.is_empty());
        assert_eq!(e.as_rect(100.0, 200.0), Rect::new(50, 50, 100, 50));
    }

    #[test]
    fn too_few_numbers_leaves_extent_empty() {
        let mut e = Extent::new();
        e.from_text("POLYGON ((0.1 0.1, 0.3 0.1, 0.3 0.3))");
        assert!(e.is_empty());
        assert_eq!(e.as_rect(100.0, 100.0), Rect::default());
        assert!(Extent::parse("garbage").is_err());
    }

    #[test]
    fn degenerate_reference_size() {
        let mut e = Extent::from_rect(Rect::new(1, 1, 5, 5));
        assert_eq!(e.to_text(0.0, 640.0), "");
        assert!(e.is_empty());
    }

    #[test]
    fn serde_uses_polygon_text() {
        let mut e = Extent::from_rect(Rect::new(0, 0, 50, 50));
        e.to_text(100.0, 100.0);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.starts_with("\"POLYGON (("));

        let back: Extent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_rect(100.0, 100.0), Rect::new(0, 0, 50, 50));

        let none: Extent = serde_json::from_str("null").unwrap();
        assert!(none.is_empty());
    }
}
