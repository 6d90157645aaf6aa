use percent_encoding::percent_decode_str;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::ProbeError;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("media not found: {0}")]
    NotFound(PathBuf),
    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("unsupported media: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decode failed: {0}")]
    Failed(String),
    #[error("decoder io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProperties {
    pub width: u32,
    pub height: u32,
    /// Frames per second; 0.0 when unknown.
    pub frame_rate: f64,
    /// Total frames; 0 when unknown.
    pub frame_count: u64,
}

impl SourceProperties {
    pub fn frame_index_at(&self, position_ms: i64) -> u64 {
        if self.frame_rate <= 0.0 || position_ms <= 0 {
            return 0;
        }
        (position_ms as f64 * self.frame_rate / 1000.0).floor() as u64
    }

    pub fn position_of(&self, index: u64) -> i64 {
        if self.frame_rate <= 0.0 {
            return 0;
        }
        (index as f64 * 1000.0 / self.frame_rate).round() as i64
    }
}

/// Decoded RGB24 picture.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub position_ms: i64,
    pub width: u32,
    pub height: u32,
    pub rgb: Arc<[u8]>,
}

/// Decode handle for one opened clip.
///
/// Seeks saturate to the clip bounds. `next_frame` returning `Ok(None)`
/// means the stream is exhausted.
pub trait MediaSource: Send {
    fn properties(&self) -> SourceProperties;

    fn seek(&mut self, position_ms: i64) -> Result<(), DecodeError>;

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError>;

    /// Playback-rate hint. Sources that decode on demand can ignore it.
    fn set_rate(&mut self, _rate: f64) {}
}

pub trait MediaOpener {
    fn open(&self, uri: &str) -> Result<Box<dyn MediaSource>, OpenError>;
}

/// Accepts plain paths and `file://` URIs (percent-encoded).
pub fn resolve_uri(uri: &str) -> PathBuf {
    match uri.strip_prefix("file://") {
        Some(rest) => PathBuf::from(percent_decode_str(rest).decode_utf8_lossy().into_owned()),
        None => PathBuf::from(uri),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_resolution() {
        assert_eq!(
            resolve_uri("file:///data/reef%20survey/T1.mp4"),
            PathBuf::from("/data/reef survey/T1.mp4")
        );
        assert_eq!(resolve_uri("clips/T1.mp4"), PathBuf::from("clips/T1.mp4"));
    }

    #[test]
    fn frame_position_math() {
        let props = SourceProperties {
            width: 4,
            height: 4,
            frame_rate: 25.0,
            frame_count: 250,
        };
        assert_eq!(props.frame_index_at(1000), 25);
        assert_eq!(props.frame_index_at(-5), 0);
        assert_eq!(props.position_of(25), 1000);
    }
}
