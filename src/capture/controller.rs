use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::CaptureLoop;
use super::report::CaptureReport;

/// Owns the spawned capture loop task and its cancellation token.
pub struct CaptureController {
    handle: Option<JoinHandle<CaptureReport>>,
    cancel_token: CancellationToken,
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the loop at its next suspension point when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(&mut self, capture_loop: CaptureLoop) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture loop already active");
        }
        if self.cancel_token.is_cancelled() {
            self.cancel_token = CancellationToken::new();
        }

        let token = self.cancel_token.clone();
        self.handle = Some(tokio::spawn(capture_loop.run(token)));
        Ok(())
    }

    pub fn request_stop(&self) {
        if !self.cancel_token.is_cancelled() {
            info!("stop requested, finishing the current tick");
            self.cancel_token.cancel();
        }
    }

    /// Waits for the loop to finish on its own or after a stop request.
    pub async fn wait(&mut self) -> Result<CaptureReport> {
        let Some(handle) = self.handle.take() else {
            bail!("capture loop is not running");
        };
        handle.await.context("capture loop task failed to join")
    }

    pub async fn stop(&mut self) -> Result<CaptureReport> {
        self.request_stop();
        self.wait().await
    }
}
