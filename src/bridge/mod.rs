pub mod camera;
pub mod light;
pub mod overlay;
pub mod pigpio;

pub use camera::{Camera, StillCamera};
pub use light::{LightDriver, LightGuard, LIGHT_OFF};
pub use overlay::{ImageMagickOverlay, Overlay};
pub use pigpio::PigpioClient;

use anyhow::{bail, Context, Result};
use log::debug;
use std::process::Stdio;
use tokio::process::Command;

/// Runs an external program to completion and turns a non-zero exit into an
/// error carrying the tail of its stderr.
///
/// The child is killed if the returned future is dropped before it exits,
/// so a caller that gives up on the call never leaves the program running.
async fn run_program(mut command: Command) -> Result<()> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    debug!("running {command:?}");

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn {program}. Is it installed?"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        bail!("{program} exited with {}: {}", output.status, tail.join(" | "));
    }
    Ok(())
}
