use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSION: &str = "jpg";
pub const TIMESTAMPED_DIR: &str = "timestamped";
const FILENAME_TIME_FORMAT: &str = "%d_%m_%y-%H_%M_%S";

/// Creates the capture directory and, when annotating, its `timestamped/` sibling tree.
pub fn prepare_output_dir(output_dir: &Path, with_overlay: bool) -> Result<()> {
    let target = if with_overlay {
        output_dir.join(TIMESTAMPED_DIR)
    } else {
        output_dir.to_path_buf()
    };
    fs::create_dir_all(&target)
        .with_context(|| format!("Creation of directory {} failed", target.display()))
}

/// `dd:hh:mm:ss`, days are padded but never truncated.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;
    format!("{days:02}:{hours:02}:{minutes:02}:{seconds:02}")
}

/// Per-process counters. Nothing here outlives the process.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    output_dir: PathBuf,
    session_start: DateTime<Utc>,
    image_count: u64,
    capture_failures: u64,
    overlay_failures: u64,
    consecutive_failures: u32,
    cycles_started: u32,
}

impl CaptureSession {
    pub fn new(output_dir: PathBuf, session_start: DateTime<Utc>) -> Self {
        Self {
            output_dir,
            session_start,
            image_count: 0,
            capture_failures: 0,
            overlay_failures: 0,
            consecutive_failures: 0,
            cycles_started: 1,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn image_count(&self) -> u64 {
        self.image_count
    }

    pub fn capture_failures(&self) -> u64 {
        self.capture_failures
    }

    pub fn overlay_failures(&self) -> u64 {
        self.overlay_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cycles_started(&self) -> u32 {
        self.cycles_started
    }

    /// Name of the next frame, e.g. `img0042_05_03_21-17_39_46.jpg`.
    pub fn frame_name<Tz>(&self, taken_at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        format!(
            "img{:04}_{}.{IMAGE_EXTENSION}",
            self.image_count,
            taken_at.format(FILENAME_TIME_FORMAT)
        )
    }

    pub fn capture_path(&self, frame_name: &str) -> PathBuf {
        self.output_dir.join(frame_name)
    }

    pub fn annotated_path(&self, frame_name: &str) -> PathBuf {
        self.output_dir.join(TIMESTAMPED_DIR).join(frame_name)
    }

    pub fn elapsed_stamp(&self, now: DateTime<Utc>) -> String {
        format_elapsed(now - self.session_start)
    }

    /// Counts a capture attempt; the sequence number advances whatever the outcome.
    pub fn record_capture(&mut self, succeeded: bool) {
        self.image_count += 1;
        if succeeded {
            self.consecutive_failures = 0;
        } else {
            self.capture_failures += 1;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    pub fn record_overlay_failure(&mut self) {
        self.overlay_failures += 1;
    }

    pub fn record_cycle(&mut self) {
        self.cycles_started = self.cycles_started.saturating_add(1);
    }
}
