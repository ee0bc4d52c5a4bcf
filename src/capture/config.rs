use std::time::Duration;

/// How the sleep between ticks is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTiming {
    /// Sleep `tick_interval - overhead_allowance` after each tick. Collaborator
    /// latency beyond the allowance accumulates as drift.
    Relative,
    /// Sleep until the previous target plus `tick_interval`, so latency does not
    /// accumulate. Re-anchored after phase pauses and overruns.
    Anchored,
}

/// What to do when the camera keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and carry on.
    Lenient,
    /// Stop the loop after this many consecutive capture failures.
    Strict { max_consecutive_failures: u32 },
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub tick_interval: Duration,
    pub overhead_allowance: Duration,
    /// Duty cycle while the light is on, 0-255.
    pub intensity: u8,
    pub light_period_hours: u32,
    pub timing: TickTiming,
    pub failure_policy: FailurePolicy,
    pub collaborator_timeout: Duration,
    /// Stop cleanly after this many captures.
    pub frame_limit: Option<u64>,
    pub overlay_label_prefix: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            overhead_allowance: Duration::from_secs(4),
            intensity: 255,
            light_period_hours: 12,
            timing: TickTiming::Relative,
            failure_policy: FailurePolicy::Lenient,
            collaborator_timeout: Duration::from_secs(30),
            frame_limit: None,
            overlay_label_prefix: "T: ".into(),
        }
    }
}

impl LoopConfig {
    /// Sleep after a tick in relative mode, floored at zero.
    pub fn relative_sleep(&self) -> Duration {
        self.tick_interval.saturating_sub(self.overhead_allowance)
    }
}
