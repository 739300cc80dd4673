//! Progress recovery from the encoder's free-form log.
//!
//! ffmpeg has no structured progress channel on its default output, so two
//! signals are sniffed from plain lines:
//!
//! - `Duration: HH:MM:SS.ff` announces the input's length once per file
//! - `frame=… time=HH:MM:SS.ff …` status lines move the encode cursor
//!
//! Malformed fields are logged and skipped; they never fail the file.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::timecode::parse_clock;

pub const DURATION_MARKER: &str = "Duration:";
pub const FRAME_MARKER: &str = "frame=";
pub const TIME_MARKER: &str = "time=";
pub const NOT_AVAILABLE: &str = "N/A";

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration:\s*([^,\s]+)").expect("valid regex"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=\s*(\S+)").expect("valid regex"));

/// A progress reading, emitted once both duration and cursor are known
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub cursor_seconds: f64,
    pub total_seconds: f64,
}

impl Observation {
    /// Share of the current file done, clamped to `[0, 1]`.
    ///
    /// The encoder's cursor can run slightly past the announced duration near
    /// the end of a file.
    pub fn file_fraction(&self) -> f64 {
        fraction(self.cursor_seconds, self.total_seconds)
    }

    /// Share of the whole batch done given the seconds committed by earlier files
    pub fn batch_fraction(&self, completed_seconds: f64, estimated_total_seconds: f64) -> f64 {
        fraction(completed_seconds + self.cursor_seconds, estimated_total_seconds)
    }
}

/// `part / whole` clamped to `[0, 1]`; zero when `whole` is not positive.
pub fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Per-file parsing state
#[derive(Debug, Clone)]
pub struct ProgressParser {
    fallback_total: f64,
    total_seconds: Option<f64>,
    cursor_seconds: f64,
}

impl ProgressParser {
    /// `fallback_total` stands in for the duration when the encoder reports it as `N/A`.
    pub fn new(fallback_total: f64) -> Self {
        Self {
            fallback_total,
            total_seconds: None,
            cursor_seconds: 0.0,
        }
    }

    pub fn total_seconds(&self) -> Option<f64> {
        self.total_seconds
    }

    pub fn cursor_seconds(&self) -> f64 {
        self.cursor_seconds
    }

    /// Consume one output line and return an observation when progress is measurable
    pub fn feed(&mut self, line: &str) -> Option<Observation> {
        if line.contains(DURATION_MARKER) {
            self.read_duration(line);
        } else if line.starts_with(FRAME_MARKER) && line.contains(TIME_MARKER) {
            self.read_cursor(line);
        }

        let total = self.total_seconds.unwrap_or(0.0);
        if self.cursor_seconds > 0.0 && total > 0.0 {
            Some(Observation {
                cursor_seconds: self.cursor_seconds,
                total_seconds: total,
            })
        } else {
            None
        }
    }

    fn read_duration(&mut self, line: &str) {
        let Some(field) = DURATION_RE.captures(line).map(|c| c[1].to_string()) else {
            warn!("Duration line without a value: {}", line.trim());
            return;
        };

        if field == NOT_AVAILABLE {
            debug!("Duration not available, using estimate of {}s", self.fallback_total);
            self.total_seconds = Some(self.fallback_total);
            return;
        }

        match parse_clock(whole_seconds(&field)) {
            Some(seconds) => self.total_seconds = Some(seconds as f64),
            None => warn!("Failed to parse duration: {}", field),
        }
    }

    fn read_cursor(&mut self, line: &str) {
        let Some(field) = TIME_RE.captures(line).map(|c| c[1].to_string()) else {
            return;
        };

        match parse_clock(whole_seconds(&field)) {
            Some(seconds) => self.cursor_seconds = seconds as f64,
            None => debug!("Failed to parse encode time: {}", field),
        }
    }
}

/// Drop the fractional-seconds part of `HH:MM:SS.ff`
fn whole_seconds(field: &str) -> &str {
    field.split('.').next().unwrap_or(field)
}
