use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::{FailurePolicy, LoopConfig, TickTiming};
use crate::settings::{CameraSettings, LightSettings, OverlaySettings, TimelapseSettings};

#[derive(Parser, Debug)]
#[command(name = "pilapse")]
#[command(version)]
#[command(
    about = "Takes a timelapse at the given interval over a repeating 24 hour light/dark cycle",
    long_about = None
)]
#[command(after_help = "Images are numbered and datetime stamped, e.g. img0001_05_03_21-17_39_46.jpg. \
The cycle always starts with the light period; in the dark period the light is only \
switched on for the capture itself. Runs until interrupted with Ctrl-C.\n\n\
NOTE: the pigpio daemon must be running first: sudo pigpiod")]
pub struct Cli {
    /// Period between images in seconds
    #[arg(short = 't', long = "time-sec", value_name = "SECONDS",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub time_sec: u64,

    /// Output directory, created if missing
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Light intensity while on, 30 (dim) to 255 (fully on)
    #[arg(short = 'l', long = "light-intensity", value_name = "DUTY",
          value_parser = clap::value_parser!(u8).range(30..=255))]
    pub light_intensity: u8,

    /// Hours of light in each 24 hour cycle
    #[arg(short = 'p', long = "time-period", value_name = "HOURS",
          value_parser = clap::value_parser!(u32).range(0..=24))]
    pub time_period: u32,

    /// JSON file tuning the camera, overlay, light and timing
    #[arg(short, long, value_name = "FILE", env = "PILAPSE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Skip the timestamp overlay copies
    #[arg(long)]
    pub no_overlay: bool,

    /// Stop after repeated consecutive capture failures instead of carrying on
    #[arg(long)]
    pub strict: bool,

    /// Schedule ticks against absolute targets so capture latency does not drift
    #[arg(long)]
    pub anchored: bool,

    /// Stop after this many images
    #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u64).range(1..))]
    pub frames: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Command line and settings file merged into what the loop and bridge need.
#[derive(Debug, Clone)]
pub struct TimelapseConfig {
    pub output_dir: PathBuf,
    pub loop_config: LoopConfig,
    pub camera: CameraSettings,
    pub overlay: Option<OverlaySettings>,
    pub light: LightSettings,
}

impl TimelapseConfig {
    pub fn resolve(cli: &Cli, settings: TimelapseSettings) -> Result<Self> {
        let timing = &settings.timing;
        if timing.collaborator_timeout_secs == 0 {
            bail!("timing.collaborator_timeout_secs must be at least 1");
        }
        if cli.strict && timing.max_consecutive_failures == 0 {
            bail!("timing.max_consecutive_failures must be at least 1 in strict mode");
        }
        if settings.camera.program.trim().is_empty() {
            bail!("camera.program must not be empty");
        }

        let failure_policy = if cli.strict {
            FailurePolicy::Strict {
                max_consecutive_failures: timing.max_consecutive_failures,
            }
        } else {
            FailurePolicy::Lenient
        };

        let overlay_enabled = settings.overlay.enabled && !cli.no_overlay;

        let loop_config = LoopConfig {
            tick_interval: Duration::from_secs(cli.time_sec),
            overhead_allowance: Duration::from_secs(timing.overhead_allowance_secs),
            intensity: cli.light_intensity,
            light_period_hours: cli.time_period,
            timing: if cli.anchored {
                TickTiming::Anchored
            } else {
                TickTiming::Relative
            },
            failure_policy,
            collaborator_timeout: Duration::from_secs(timing.collaborator_timeout_secs),
            frame_limit: cli.frames,
            overlay_label_prefix: settings.overlay.label_prefix.clone(),
        };

        Ok(Self {
            output_dir: cli.output.clone(),
            loop_config,
            camera: settings.camera,
            overlay: overlay_enabled.then_some(settings.overlay),
            light: settings.light,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pilapse").chain(args.iter().copied()))
    }

    #[test]
    fn short_flags_match_the_field_setup() {
        let cli = parse(&["-t", "60", "-o", "/data/tl", "-l", "200", "-p", "10"]).unwrap();

        assert_eq!(cli.time_sec, 60);
        assert_eq!(cli.output, PathBuf::from("/data/tl"));
        assert_eq!(cli.light_intensity, 200);
        assert_eq!(cli.time_period, 10);
        assert!(!cli.strict && !cli.anchored && !cli.no_overlay);
    }

    #[test]
    fn intensity_and_period_ranges_are_enforced() {
        assert!(parse(&["-t", "60", "-o", "x", "-l", "29", "-p", "10"]).is_err());
        assert!(parse(&["-t", "60", "-o", "x", "-l", "256", "-p", "10"]).is_err());
        assert!(parse(&["-t", "60", "-o", "x", "-l", "30", "-p", "25"]).is_err());
        assert!(parse(&["-t", "0", "-o", "x", "-l", "30", "-p", "0"]).is_err());
        assert!(parse(&["-t", "1", "-o", "x", "-l", "255", "-p", "24"]).is_ok());
    }

    #[test]
    fn all_four_core_options_are_required() {
        assert!(parse(&["-o", "x", "-l", "100", "-p", "10"]).is_err());
        assert!(parse(&["-t", "5", "-l", "100", "-p", "10"]).is_err());
        assert!(parse(&["-t", "5", "-o", "x", "-p", "10"]).is_err());
        assert!(parse(&["-t", "5", "-o", "x", "-l", "100"]).is_err());
    }

    #[test]
    fn resolve_maps_flags_onto_loop_config() {
        let cli = parse(&[
            "-t", "60", "-o", "/data/tl", "-l", "200", "-p", "10", "--strict", "--anchored",
            "--frames", "12",
        ])
        .unwrap();
        let config = TimelapseConfig::resolve(&cli, TimelapseSettings::default()).unwrap();

        let loop_config = &config.loop_config;
        assert_eq!(loop_config.tick_interval, Duration::from_secs(60));
        assert_eq!(loop_config.relative_sleep(), Duration::from_secs(56));
        assert_eq!(loop_config.intensity, 200);
        assert_eq!(loop_config.light_period_hours, 10);
        assert_eq!(loop_config.timing, TickTiming::Anchored);
        assert_eq!(
            loop_config.failure_policy,
            FailurePolicy::Strict {
                max_consecutive_failures: 3
            }
        );
        assert_eq!(loop_config.frame_limit, Some(12));
        assert!(config.overlay.is_some());
        assert_eq!(config.light.gpio, 17);
    }

    #[test]
    fn overlay_can_be_disabled_from_either_side() {
        let cli = parse(&["-t", "60", "-o", "x", "-l", "200", "-p", "10", "--no-overlay"]).unwrap();
        let config = TimelapseConfig::resolve(&cli, TimelapseSettings::default()).unwrap();
        assert!(config.overlay.is_none());

        let cli = parse(&["-t", "60", "-o", "x", "-l", "200", "-p", "10"]).unwrap();
        let mut settings = TimelapseSettings::default();
        settings.overlay.enabled = false;
        let config = TimelapseConfig::resolve(&cli, settings).unwrap();
        assert!(config.overlay.is_none());
    }

    #[test]
    fn nonsensical_settings_are_rejected() {
        let cli = parse(&["-t", "60", "-o", "x", "-l", "200", "-p", "10", "--strict"]).unwrap();

        let mut settings = TimelapseSettings::default();
        settings.timing.max_consecutive_failures = 0;
        assert!(TimelapseConfig::resolve(&cli, settings).is_err());

        let mut settings = TimelapseSettings::default();
        settings.timing.collaborator_timeout_secs = 0;
        assert!(TimelapseConfig::resolve(&cli, settings).is_err());
    }
}
