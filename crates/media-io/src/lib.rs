use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

mod source;
pub use source::*;
mod ffmpeg;
pub use ffmpeg::{FfmpegOpener, FfmpegSource};
pub mod synthetic;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe not found on PATH; please install FFmpeg (ffprobe)")]
    FfprobeMissing,
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FfprobeJson {
    streams: Option<Vec<FfprobeStream>>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub has_video: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps_num: Option<u32>,
    pub fps_den: Option<u32>,
    pub frame_count: Option<u64>,
    pub duration_seconds: Option<f64>,
}

impl MediaInfo {
    pub fn frame_rate(&self) -> Option<f64> {
        match (self.fps_num, self.fps_den) {
            (Some(n), Some(d)) if d != 0 => Some(n as f64 / d as f64),
            _ => None,
        }
    }

    /// Container frame count, else duration x rate.
    pub fn estimated_frames(&self) -> u64 {
        if let Some(n) = self.frame_count.filter(|n| *n > 0) {
            return n;
        }
        match (self.duration_seconds, self.frame_rate()) {
            (Some(d), Some(fps)) if d > 0.0 && fps > 0.0 => (d * fps).round() as u64,
            _ => 0,
        }
    }
}

fn parse_rate(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    if s == "0/0" || s == "0" || s.is_empty() {
        return None;
    }
    if let Some((a, b)) = s.split_once('/') {
        let num = a.parse().ok()?;
        let den = b.parse().ok()?;
        if den == 0 {
            return None;
        }
        return Some((num, den));
    }
    let v: u32 = s.parse().ok()?;
    Some((v, 1))
}

fn parse_probe_output(path: &Path, stdout: &[u8]) -> Result<MediaInfo, ProbeError> {
    let parsed: FfprobeJson =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let video = parsed
        .streams
        .iter()
        .flatten()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let fps = video.and_then(|s| {
        s.avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rate))
    });
    let (fps_num, fps_den) = fps.map(|(n, d)| (Some(n), Some(d))).unwrap_or((None, None));

    let duration_seconds = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse().ok());

    Ok(MediaInfo {
        path: path.to_path_buf(),
        has_video: video.is_some(),
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        fps_num,
        fps_den,
        frame_count: video
            .and_then(|s| s.nb_frames.as_deref())
            .and_then(|n| n.parse().ok()),
        duration_seconds,
    })
}

pub fn probe_media(path: &Path) -> Result<MediaInfo, ProbeError> {
    let ffprobe = which::which("ffprobe").map_err(|_| ProbeError::FfprobeMissing)?;
    let out = Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-show_format")
        .arg("-show_streams")
        .arg("-print_format")
        .arg("json")
        .arg(path)
        .output()
        .map_err(|e| ProbeError::FfprobeFailed(e.to_string()))?;
    if !out.status.success() {
        return Err(ProbeError::FfprobeFailed(
            String::from_utf8_lossy(&out.stderr).into(),
        ));
    }
    let info = parse_probe_output(path, &out.stdout)?;
    debug!(
        path = %path.display(),
        frames = info.estimated_frames(),
        fps = ?info.frame_rate(),
        "probed media"
    );
    Ok(info)
}
