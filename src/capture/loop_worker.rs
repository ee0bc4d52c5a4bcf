use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::bridge::{Camera, LightGuard, Overlay};
use crate::schedule::{Clock, Phase, PhaseScheduler};

use super::config::{FailurePolicy, LoopConfig, TickTiming};
use super::report::{CaptureReport, StopReason};
use super::session::CaptureSession;

// Set to false to silence this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// The light/dark capture control loop.
///
/// One tick is one capture attempt: LIGHT ticks keep the light at the
/// configured intensity, DARK ticks flash it only around the camera call.
/// Crossing a phase boundary switches the light off and pauses one tick
/// interval before ticking resumes. All side effects happen here; the
/// scheduler only answers questions about time.
pub struct CaptureLoop {
    config: LoopConfig,
    scheduler: PhaseScheduler,
    session: CaptureSession,
    light: LightGuard,
    camera: Arc<dyn Camera>,
    overlay: Option<Arc<dyn Overlay>>,
    clock: Arc<dyn Clock>,
    active_phase: Option<Phase>,
    next_target: Option<Instant>,
}

impl CaptureLoop {
    pub fn new(
        config: LoopConfig,
        clock: Arc<dyn Clock>,
        light: LightGuard,
        camera: Arc<dyn Camera>,
        overlay: Option<Arc<dyn Overlay>>,
        output_dir: PathBuf,
    ) -> Result<Self> {
        let started_at = clock.now();
        let scheduler = PhaseScheduler::new(config.light_period_hours, started_at)?;

        Ok(Self {
            config,
            scheduler,
            session: CaptureSession::new(output_dir, started_at),
            light,
            camera,
            overlay,
            clock,
            active_phase: None,
            next_target: None,
        })
    }

    /// Runs until cancelled, the frame limit is hit, strict mode gives up or
    /// a fault occurs. The light is off and released when this returns.
    pub async fn run(mut self, cancel_token: CancellationToken) -> CaptureReport {
        log_info!(
            "capture loop starting: every {}s, {}h light per cycle, intensity {}, output {}",
            self.config.tick_interval.as_secs_f32(),
            self.scheduler.light_period_hours(),
            self.config.intensity,
            self.session.output_dir().display()
        );

        let stop_reason = match self.drive(&cancel_token).await {
            Ok(reason) => reason,
            Err(err) => {
                log_error!("capture loop failed: {err:#}");
                StopReason::Fault(format!("{err:#}"))
            }
        };

        let shutdown_error = match self.light.shutdown().await {
            Ok(()) => {
                log_info!("light channel {} off and released", self.light.channel());
                None
            }
            Err(err) => {
                log_error!("light shutdown failed: {err:#}");
                Some(format!("{err:#}"))
            }
        };

        CaptureReport {
            stop_reason,
            image_count: self.session.image_count(),
            output_dir: self.session.output_dir().to_path_buf(),
            capture_failures: self.session.capture_failures(),
            overlay_failures: self.session.overlay_failures(),
            cycles_started: self.session.cycles_started(),
            started_at: self.session.session_start(),
            stopped_at: self.clock.now(),
            shutdown_error,
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<StopReason> {
        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if self.frame_limit_reached() {
                return Ok(StopReason::FrameLimit);
            }

            let now = self.clock.now();
            if self.scheduler.advance_if_expired(now) {
                self.session.record_cycle();
                let phase = self.scheduler.current_phase(now);
                if !self.enter_phase(phase, now, true, cancel).await? {
                    return Ok(StopReason::Cancelled);
                }
                continue;
            }

            let phase = self.scheduler.current_phase(now);
            match self.active_phase {
                Some(active) if active == phase => {}
                Some(_) => {
                    if !self.enter_phase(phase, now, false, cancel).await? {
                        return Ok(StopReason::Cancelled);
                    }
                    continue;
                }
                None => {
                    log_info!("{phase} period begins {}", local_time(now));
                    self.active_phase = Some(phase);
                }
            }

            let tick_started = Instant::now();
            self.tick(phase, now, cancel).await?;

            if let Some(reason) = self.failure_limit_reached() {
                return Ok(reason);
            }
            if self.frame_limit_reached() {
                return Ok(StopReason::FrameLimit);
            }
            if !self.wait_for_next_tick(tick_started, cancel).await {
                return Ok(StopReason::Cancelled);
            }
        }
    }

    /// Boundary crossing: light off, announce, pause one tick interval.
    /// Returns false when cancelled during the pause.
    async fn enter_phase(
        &mut self,
        phase: Phase,
        now: DateTime<Utc>,
        new_cycle: bool,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.active_phase = Some(phase);
        self.light.off().await?;

        if new_cycle {
            log_info!(
                "cycle {} starts, {phase} period begins {}",
                self.session.cycles_started(),
                local_time(now)
            );
        } else {
            log_info!("{phase} period begins {}", local_time(now));
        }
        log_debug!(
            "{phase} period ends in {}s",
            self.scheduler.time_until_phase_end(now).num_seconds()
        );

        self.next_target = None;
        let deadline = Instant::now() + self.config.tick_interval;
        Ok(sleep_until(deadline, cancel).await)
    }

    async fn tick(
        &mut self,
        phase: Phase,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let frame_name = self.session.frame_name(&now.with_timezone(&Local));
        let capture_path = self.session.capture_path(&frame_name);
        let label = format!(
            "{}{}",
            self.config.overlay_label_prefix,
            self.session.elapsed_stamp(now)
        );
        log_info!("{label} capturing {frame_name}");

        // Steady in the light phase, a flash around the capture in the dark.
        self.light.set_level(self.config.intensity).await?;

        let capture_started = Instant::now();
        let camera = Arc::clone(&self.camera);
        let target = capture_path.clone();
        let captured = run_collaborator("capture", self.config.collaborator_timeout, async move {
            camera.capture(&target).await
        })
        .await;
        let capture_ms = capture_started.elapsed().as_millis();

        self.session.record_capture(captured.is_ok());
        if phase == Phase::Dark {
            self.light.off().await?;
        }

        match captured {
            Ok(()) => log_debug!("captured {} in {capture_ms}ms", capture_path.display()),
            Err(err) => {
                log_warn!(
                    "capture of {frame_name} failed after {capture_ms}ms: {err:#}"
                );
                return Ok(());
            }
        }

        let Some(overlay) = self.overlay.clone() else {
            return Ok(());
        };
        if cancel.is_cancelled() {
            log_debug!("skipping overlay for {frame_name}, shutdown requested");
            return Ok(());
        }

        let source = capture_path;
        let dest = self.session.annotated_path(&frame_name);
        let overlay_started = Instant::now();
        let annotated = run_collaborator("overlay", self.config.collaborator_timeout, async move {
            overlay.annotate(&source, &label, &dest).await
        })
        .await;
        if let Err(err) = annotated {
            self.session.record_overlay_failure();
            log_warn!(
                "overlay of {frame_name} failed after {}ms: {err:#}",
                overlay_started.elapsed().as_millis()
            );
        }
        Ok(())
    }

    async fn wait_for_next_tick(&mut self, tick_started: Instant, cancel: &CancellationToken) -> bool {
        let deadline = match self.config.timing {
            TickTiming::Relative => Instant::now() + self.config.relative_sleep(),
            TickTiming::Anchored => {
                let target = self.next_target.unwrap_or(tick_started) + self.config.tick_interval;
                let now = Instant::now();
                if target < now {
                    log_warn!(
                        "tick overran its slot by {}ms, re-anchoring",
                        (now - target).as_millis()
                    );
                    self.next_target = Some(now);
                    now
                } else {
                    self.next_target = Some(target);
                    target
                }
            }
        };
        sleep_until(deadline, cancel).await
    }

    fn frame_limit_reached(&self) -> bool {
        self.config
            .frame_limit
            .is_some_and(|limit| self.session.image_count() >= limit)
    }

    fn failure_limit_reached(&self) -> Option<StopReason> {
        let FailurePolicy::Strict {
            max_consecutive_failures,
        } = self.config.failure_policy
        else {
            return None;
        };

        let consecutive = self.session.consecutive_failures();
        if consecutive >= max_consecutive_failures.max(1) {
            log_error!("giving up after {consecutive} consecutive capture failures");
            return Some(StopReason::FailureLimit {
                consecutive_failures: consecutive,
            });
        }
        None
    }
}

/// Runs a collaborator call as its own task, bounded by `limit`.
///
/// A panic comes back as an error. On timeout the task is aborted and
/// awaited, so the call (and any program it started) has ended before the
/// loop touches the light again.
async fn run_collaborator<F>(what: &str, limit: Duration, job: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let mut task = tokio::spawn(job);
    match time::timeout(limit, &mut task).await {
        Ok(joined) => joined.with_context(|| format!("{what} task failed"))?,
        Err(_) => {
            task.abort();
            if let Err(err) = task.await {
                if err.is_panic() {
                    log_warn!("{what} panicked while being abandoned");
                }
            }
            Err(anyhow!("{what} timed out after {limit:?}"))
        }
    }
}

/// False when cancelled before the deadline.
async fn sleep_until(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log_info!("capture loop shutting down");
            false
        }
        _ = time::sleep_until(deadline) => true,
    }
}

fn local_time(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
