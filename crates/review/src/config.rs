use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{ReviewError, Result};

pub const SERVER_URL_ENV: &str = "ANNOTATOR_SERVER_URL";

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("annotator")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub server_url: String,
    /// Searched recursively for a set's video file.
    pub media_dir: PathBuf,
    pub tick_interval_ms: Option<u64>,
    pub seek_back_step_ms: i64,
    pub progress_report_ms: i64,
    /// Arrow-key step.
    pub step_ms: i64,
    /// Commit every drag movement on the seek bar instead of on release.
    pub click_to_seek: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            media_dir: dirs::video_dir().unwrap_or_else(|| app_data_dir().join("media")),
            tick_interval_ms: None,
            seek_back_step_ms: 500,
            progress_report_ms: 30_000,
            step_ms: 1000,
            click_to_seek: false,
        }
    }
}

impl ReviewConfig {
    pub fn default_path() -> PathBuf {
        app_data_dir().join("config.json")
    }

    /// Reads `path` (or the default location). A missing file yields the
    /// defaults. `ANNOTATOR_SERVER_URL` overrides the server address.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let parsed: ReviewConfig = serde_json::from_str(&text)
                .map_err(|e| ReviewError::Config(format!("{}: {e}", path.display())))?;
            debug!(path = %path.display(), "config loaded");
            parsed
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            ReviewConfig::default()
        };
        config.override_server_url(std::env::var(SERVER_URL_ENV).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ReviewError::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn override_server_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            debug!(%url, "server url overridden from environment");
            self.server_url = url.trim().to_string();
        }
    }

    pub fn playback(&self) -> PlaybackConfig {
        let mut cfg = PlaybackConfig {
            seek_back_step_ms: self.seek_back_step_ms,
            progress_report_ms: self.progress_report_ms,
            ..PlaybackConfig::default()
        };
        if let Some(ms) = self.tick_interval_ms.filter(|ms| *ms > 0) {
            cfg.tick_interval = Duration::from_millis(ms);
        }
        cfg
    }

    /// Locate `video_file` under `media_dir`, matching by file name.
    pub fn find_media(&self, video_file: &str) -> Option<PathBuf> {
        let wanted = Path::new(video_file);
        if wanted.is_absolute() && wanted.exists() {
            return Some(wanted.to_path_buf());
        }
        let direct = self.media_dir.join(wanted);
        if direct.is_file() {
            return Some(direct);
        }
        let name = wanted.file_name()?;
        let found = WalkDir::new(&self.media_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.file_name() == name)
            .map(|e| e.path().to_path_buf());
        if found.is_none() {
            warn!(video_file, dir = %self.media_dir.display(), "media not found");
        }
        found
    }
}
