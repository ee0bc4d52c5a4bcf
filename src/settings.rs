use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::bridge::pigpio;

/// Still-capture program invocation: `<program> <args..> <output_flag> <path>`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSettings {
    pub program: String,
    pub args: Vec<String>,
    /// Flag placed before the output path. Empty passes the path positionally.
    pub output_flag: String,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            program: "raspistill".into(),
            args: ["-t", "100", "-ex", "night", "-n"]
                .into_iter()
                .map(String::from)
                .collect(),
            output_flag: "-o".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlaySettings {
    pub enabled: bool,
    pub program: String,
    pub point_size: u32,
    pub fill: String,
    pub offset_x: u32,
    pub offset_y: u32,
    pub label_prefix: String,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "convert".into(),
            point_size: 90,
            fill: "white".into(),
            offset_x: 3350,
            offset_y: 2900,
            label_prefix: "T: ".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LightSettings {
    /// Broadcom GPIO number driving the LED MOSFET.
    pub gpio: u32,
    pub daemon_host: String,
    pub daemon_port: u16,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            gpio: 17,
            daemon_host: pigpio::DEFAULT_HOST.into(),
            daemon_port: pigpio::DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    /// Subtracted from the tick interval to absorb capture latency.
    pub overhead_allowance_secs: u64,
    pub collaborator_timeout_secs: u64,
    pub max_consecutive_failures: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            overhead_allowance_secs: 4,
            collaborator_timeout_secs: 30,
            max_consecutive_failures: 3,
        }
    }
}

/// Optional JSON settings file tuning the collaborators. Missing sections and
/// keys keep their defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelapseSettings {
    pub camera: CameraSettings,
    pub overlay: OverlaySettings,
    pub light: LightSettings,
    pub timing: TimingSettings,
}

impl TimelapseSettings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Applies the pigpio client's own `PIGPIO_ADDR` / `PIGPIO_PORT` variables.
    pub fn apply_env(&mut self, addr: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(addr) = addr.filter(|value| !value.is_empty()) {
            self.light.daemon_host = addr;
        }
        if let Some(port) = port.filter(|value| !value.is_empty()) {
            self.light.daemon_port = port
                .parse()
                .with_context(|| format!("PIGPIO_PORT is not a port number: {port}"))?;
        }
        Ok(())
    }
}
