use anyhow::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;

use crate::settings::OverlaySettings;

use super::run_program;

/// Burns a text label into a copy of an image. The source is left untouched.
#[async_trait]
pub trait Overlay: Send + Sync {
    async fn annotate(&self, source: &Path, text: &str, dest: &Path) -> Result<()>;
}

/// ImageMagick `convert ... -annotate +X+Y <text>` runner.
#[derive(Debug, Clone)]
pub struct ImageMagickOverlay {
    program: String,
    point_size: u32,
    fill: String,
    offset_x: u32,
    offset_y: u32,
}

impl ImageMagickOverlay {
    pub fn new(settings: &OverlaySettings) -> Self {
        Self {
            program: settings.program.clone(),
            point_size: settings.point_size,
            fill: settings.fill.clone(),
            offset_x: settings.offset_x,
            offset_y: settings.offset_y,
        }
    }

    fn command_args(&self, source: &Path, text: &str, dest: &Path) -> Vec<OsString> {
        vec![
            source.as_os_str().to_owned(),
            "-pointsize".into(),
            self.point_size.to_string().into(),
            "-fill".into(),
            OsString::from(&self.fill),
            "-annotate".into(),
            format!("+{}+{}", self.offset_x, self.offset_y).into(),
            text.into(),
            dest.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Overlay for ImageMagickOverlay {
    async fn annotate(&self, source: &Path, text: &str, dest: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(self.command_args(source, text, dest));
        run_program(command).await
    }
}
