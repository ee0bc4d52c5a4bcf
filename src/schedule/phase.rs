use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use std::cmp;
use std::fmt;

pub const CYCLE_HOURS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Light,
    Dark,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Light => "light",
            Phase::Dark => "dark",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Light/dark boundaries of the current 24 hour cycle.
///
/// The scheduler never reads the clock itself; every query takes the
/// observation instant so the loop and the tests decide what "now" is.
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    light_period_hours: u32,
    cycle_start: DateTime<Utc>,
    light_end: DateTime<Utc>,
    cycle_end: DateTime<Utc>,
}

impl PhaseScheduler {
    pub fn new(light_period_hours: u32, now: DateTime<Utc>) -> Result<Self> {
        if light_period_hours > CYCLE_HOURS {
            bail!(
                "light period must be between 0 and {CYCLE_HOURS} hours, got {light_period_hours}"
            );
        }

        let mut scheduler = Self {
            light_period_hours,
            cycle_start: now,
            light_end: now,
            cycle_end: now,
        };
        scheduler.begin_cycle(now);
        Ok(scheduler)
    }

    fn begin_cycle(&mut self, now: DateTime<Utc>) {
        self.cycle_start = now;
        self.light_end = now + Duration::hours(i64::from(self.light_period_hours));
        self.cycle_end = now + Duration::hours(i64::from(CYCLE_HOURS));
    }

    pub fn light_period_hours(&self) -> u32 {
        self.light_period_hours
    }

    pub fn cycle_start(&self) -> DateTime<Utc> {
        self.cycle_start
    }

    pub fn light_end(&self) -> DateTime<Utc> {
        self.light_end
    }

    pub fn cycle_end(&self) -> DateTime<Utc> {
        self.cycle_end
    }

    /// Phase active at `now`. Only meaningful once `advance_if_expired(now)`
    /// has been called; an instant before `cycle_start` (clock stepped back)
    /// belongs to the first non-empty phase of the cycle.
    pub fn current_phase(&self, now: DateTime<Utc>) -> Phase {
        let light_is_empty = self.light_end == self.cycle_start;
        if !light_is_empty && now < self.light_end {
            Phase::Light
        } else {
            Phase::Dark
        }
    }

    /// Starts a new cycle at `now` once the current one has run out.
    /// Returns true when a new cycle began.
    pub fn advance_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.cycle_end {
            return false;
        }
        self.begin_cycle(now);
        true
    }

    pub fn phase_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.current_phase(now) {
            Phase::Light => self.light_end,
            Phase::Dark => self.cycle_end,
        }
    }

    pub fn time_until_phase_end(&self, now: DateTime<Utc>) -> Duration {
        cmp::max(self.phase_end(now) - now, Duration::zero())
    }
}
