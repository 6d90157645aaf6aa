//! Frame source backed by an `ffmpeg` child process emitting raw RGB24.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    probe_media, resolve_uri, DecodeError, MediaOpener, MediaSource, OpenError,
    SourceProperties, VideoFrame,
};

pub struct FfmpegSource {
    path: PathBuf,
    ffmpeg: PathBuf,
    properties: SourceProperties,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    /// Index of the next frame the pipe will deliver.
    next_index: u64,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        if !path.exists() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }
        let info = probe_media(path)?;
        if !info.has_video {
            return Err(OpenError::Unsupported(format!(
                "{} has no video stream",
                path.display()
            )));
        }
        let (Some(width), Some(height)) = (info.width, info.height) else {
            return Err(OpenError::Unsupported(format!(
                "{}: unknown frame size",
                path.display()
            )));
        };
        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| OpenError::Unsupported("ffmpeg not found on PATH".into()))?;

        let properties = SourceProperties {
            width,
            height,
            frame_rate: info.frame_rate().unwrap_or(0.0),
            frame_count: info.estimated_frames(),
        };
        info!(
            path = %path.display(),
            width,
            height,
            fps = properties.frame_rate,
            frames = properties.frame_count,
            "ffmpeg source opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            ffmpeg,
            properties,
            child: None,
            stdout: None,
            next_index: 0,
        })
    }

    fn frame_bytes(&self) -> usize {
        self.properties.width as usize * self.properties.height as usize * 3
    }

    fn spawn_at(&mut self, index: u64) -> Result<(), DecodeError> {
        self.stop();
        let start_secs = self.properties.position_of(index) as f64 / 1000.0;
        debug!(path = %self.path.display(), start_secs, "spawning ffmpeg");
        let mut child = Command::new(&self.ffmpeg)
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{start_secs:.3}"))
            .arg("-i")
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "-sn", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.next_index = index;
        Ok(())
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                // already exited
                debug!("ffmpeg kill: {e}");
            }
            let _ = child.wait();
        }
    }
}

impl MediaSource for FfmpegSource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn seek(&mut self, position_ms: i64) -> Result<(), DecodeError> {
        let last = self.properties.frame_count.saturating_sub(1);
        let index = self.properties.frame_index_at(position_ms).min(last);
        if self.stdout.is_some() && index == self.next_index {
            return Ok(());
        }
        self.spawn_at(index)
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError> {
        if self.properties.frame_count > 0 && self.next_index >= self.properties.frame_count {
            return Ok(None);
        }
        if self.stdout.is_none() {
            self.spawn_at(self.next_index)?;
        }
        let mut buf = vec![0u8; self.frame_bytes()];
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(DecodeError::Failed("ffmpeg stdout unavailable".into()));
        };
        match stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(index = self.next_index, "ffmpeg stream exhausted");
                self.stop();
                return Ok(None);
            }
            Err(e) => {
                warn!("ffmpeg read failed: {e}");
                self.stop();
                return Err(e.into());
            }
        }
        let frame = VideoFrame {
            position_ms: self.properties.position_of(self.next_index),
            width: self.properties.width,
            height: self.properties.height,
            rgb: Arc::from(buf),
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens local files (plain paths or `file://` URIs) with ffmpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl MediaOpener for FfmpegOpener {
    fn open(&self, uri: &str) -> Result<Box<dyn MediaSource>, OpenError> {
        let path = resolve_uri(uri);
        Ok(Box::new(FfmpegSource::open(&path)?))
    }
}
