use anyhow::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;

use crate::settings::CameraSettings;

use super::run_program;

/// Still-image capture. Resolves once the image is written or the attempt
/// failed; dropping the future abandons the attempt.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self, output: &Path) -> Result<()>;
}

/// Runs a still-capture program such as `raspistill` or `rpicam-still`.
#[derive(Debug, Clone)]
pub struct StillCamera {
    program: String,
    args: Vec<String>,
    output_flag: String,
}

impl StillCamera {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            output_flag: settings.output_flag.clone(),
        }
    }

    fn command_args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        if !self.output_flag.is_empty() {
            args.push(OsString::from(&self.output_flag));
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Camera for StillCamera {
    async fn capture(&self, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(self.command_args(output));
        run_program(command).await
    }
}
