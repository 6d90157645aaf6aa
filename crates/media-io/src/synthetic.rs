//! Deterministic in-memory frame source for tests and headless runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::{DecodeError, MediaOpener, MediaSource, OpenError, SourceProperties, VideoFrame};

/// Generates frames whose pixels encode their frame index.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    properties: SourceProperties,
    next_index: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, frame_rate: f64, frame_count: u64) -> Self {
        Self {
            properties: SourceProperties {
                width,
                height,
                frame_rate,
                frame_count,
            },
            next_index: 0,
        }
    }

    /// Clip of `seconds` at `frame_rate`.
    pub fn with_duration(seconds: f64, frame_rate: f64) -> Self {
        Self::new(64, 36, frame_rate, (seconds * frame_rate).round() as u64)
    }

    fn render(&self, index: u64) -> VideoFrame {
        let shade = (index % 256) as u8;
        let len = self.properties.width as usize * self.properties.height as usize * 3;
        VideoFrame {
            position_ms: self.properties.position_of(index),
            width: self.properties.width,
            height: self.properties.height,
            rgb: Arc::from(vec![shade; len]),
        }
    }
}

impl MediaSource for SyntheticSource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn seek(&mut self, position_ms: i64) -> Result<(), DecodeError> {
        let last = self.properties.frame_count.saturating_sub(1);
        self.next_index = self.properties.frame_index_at(position_ms).min(last);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError> {
        if self.next_index >= self.properties.frame_count {
            return Ok(None);
        }
        let frame = self.render(self.next_index);
        self.next_index += 1;
        Ok(Some(frame))
    }
}

/// Opener over a fixed table of uri → source.
#[derive(Debug, Default, Clone)]
pub struct SyntheticOpener {
    sources: HashMap<String, SyntheticSource>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: impl Into<String>, source: SyntheticSource) -> Self {
        self.sources.insert(uri.into(), source);
        self
    }
}

impl MediaOpener for SyntheticOpener {
    fn open(&self, uri: &str) -> Result<Box<dyn MediaSource>, OpenError> {
        let source = self
            .sources
            .get(uri)
            .cloned()
            .ok_or_else(|| OpenError::NotFound(PathBuf::from(uri)))?;
        debug!(uri, frames = source.properties.frame_count, "synthetic source opened");
        Ok(Box::new(source))
    }
}
