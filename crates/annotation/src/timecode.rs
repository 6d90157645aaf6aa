//! Millisecond timecodes for the seek tooltip and the observation table.
use crate::{AnnotationError, Millis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timecode format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimecodeFormat {
    /// HH:MM:SS.mmm
    #[default]
    Clock,
    /// MM:SS (hours folded into minutes)
    Compact,
    /// Seconds with decimals (SS.mmm)
    Seconds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub millis: u32,
    pub format: TimecodeFormat,
}

impl Timecode {
    /// Negative positions display as zero.
    pub fn from_millis(ms: Millis, format: TimecodeFormat) -> Self {
        let ms = ms.max(0) as u64;
        let total_seconds = ms / 1000;
        Self {
            hours: (total_seconds / 3600) as u32,
            minutes: ((total_seconds % 3600) / 60) as u32,
            seconds: (total_seconds % 60) as u32,
            millis: (ms % 1000) as u32,
            format,
        }
    }

    pub fn to_millis(&self) -> Millis {
        let total_seconds =
            self.hours as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64;
        total_seconds * 1000 + self.millis as i64
    }

    /// Parse `HH:MM:SS.mmm`, `MM:SS` or `SS.mmm`.
    pub fn parse(s: &str) -> Result<Self, AnnotationError> {
        let bad = |why: &str| AnnotationError::InvalidTimecode(format!("{s:?}: {why}"));
        let s = s.trim();
        let (clock, frac) = match s.split_once('.') {
            Some((c, f)) => (c, Some(f)),
            None => (s, None),
        };
        let millis = match frac {
            Some(f) if !f.is_empty() && f.len() <= 3 => {
                let v: u32 = f.parse().map_err(|_| bad("milliseconds"))?;
                v * 10u32.pow(3 - f.len() as u32)
            }
            Some(_) => return Err(bad("milliseconds")),
            None => 0,
        };

        let parts: Vec<&str> = clock.split(':').collect();
        let nums = parts
            .iter()
            .map(|p| p.parse::<u32>().map_err(|_| bad("expected digits")))
            .collect::<Result<Vec<_>, _>>()?;
        let (hours, minutes, seconds, format) = match nums.as_slice() {
            [h, m, sec] => (*h, *m, *sec, TimecodeFormat::Clock),
            [m, sec] => (m / 60, m % 60, *sec, TimecodeFormat::Compact),
            [sec] => (sec / 3600, (sec % 3600) / 60, sec % 60, TimecodeFormat::Seconds),
            _ => return Err(bad("expected HH:MM:SS.mmm")),
        };

        if parts.len() > 1 && (minutes >= 60 || seconds >= 60) {
            return Err(bad("minutes and seconds must be < 60"));
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
            millis,
            format,
        })
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            TimecodeFormat::Clock => write!(
                f,
                "{:02}:{:02}:{:02}.{:03}",
                self.hours, self.minutes, self.seconds, self.millis
            ),
            TimecodeFormat::Compact => write!(
                f,
                "{:02}:{:02}",
                self.hours * 60 + self.minutes,
                self.seconds
            ),
            TimecodeFormat::Seconds => write!(f, "{:.3}", self.to_millis() as f64 / 1000.0),
        }
    }
}

/// Shorthand for `HH:MM:SS.mmm`.
pub fn format_millis(ms: Millis) -> String {
    Timecode::from_millis(ms, TimecodeFormat::Clock).to_string()
}
