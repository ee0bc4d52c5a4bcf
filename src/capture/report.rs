use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

pub const EXIT_COMPLETED: u8 = 0;
pub const EXIT_STARTUP_FAILURE: u8 = 1;
pub const EXIT_RUNTIME_FAULT: u8 = 3;
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    FrameLimit,
    FailureLimit { consecutive_failures: u32 },
    Fault(String),
}

impl StopReason {
    pub fn exit_code(&self) -> u8 {
        match self {
            StopReason::FrameLimit => EXIT_COMPLETED,
            StopReason::Cancelled => EXIT_INTERRUPTED,
            StopReason::FailureLimit { .. } | StopReason::Fault(_) => EXIT_RUNTIME_FAULT,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("interrupted"),
            StopReason::FrameLimit => f.write_str("frame limit reached"),
            StopReason::FailureLimit {
                consecutive_failures,
            } => write!(f, "{consecutive_failures} consecutive capture failures"),
            StopReason::Fault(message) => write!(f, "fault: {message}"),
        }
    }
}

/// What the capture loop leaves behind once it stops.
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub stop_reason: StopReason,
    pub image_count: u64,
    pub output_dir: PathBuf,
    pub capture_failures: u64,
    pub overlay_failures: u64,
    pub cycles_started: u32,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    /// Set when switching the light off or releasing the driver failed.
    pub shutdown_error: Option<String>,
}

impl CaptureReport {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.stop_reason.exit_code())
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Timelapse has ended ({}). There are {} images in {}",
            self.stop_reason,
            self.image_count,
            self.output_dir.display()
        );
        if self.capture_failures > 0 || self.overlay_failures > 0 {
            text.push_str(&format!(
                "\n{} capture and {} overlay failures were reported",
                self.capture_failures, self.overlay_failures
            ));
        }
        text.push_str(
            "\nIf you want to create a movie run \
             \"ffmpeg -f image2 -pattern_type glob -r 3 -i 'img*.jpg' timelapse.avi\"",
        );
        text
    }
}
