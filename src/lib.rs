pub mod bridge;
pub mod capture;
pub mod cli;
pub mod schedule;
pub mod settings;
pub mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use bridge::{Camera, ImageMagickOverlay, LightGuard, Overlay, PigpioClient, StillCamera};
use capture::{prepare_output_dir, report::EXIT_STARTUP_FAILURE, CaptureController, CaptureLoop};
use cli::{Cli, TimelapseConfig};
use schedule::SystemClock;
use settings::TimelapseSettings;

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    info!("pilapse {} starting up...", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {err}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    runtime.block_on(async move {
        let mut controller = CaptureController::new();
        if let Err(err) = start_timelapse(&cli, &mut controller) {
            error!("{err:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }

        tokio::spawn(cancel_on_signal(controller.cancel_token()));

        match controller.wait().await {
            Ok(report) => {
                if let Some(err) = &report.shutdown_error {
                    warn!("light may still be on: {err}");
                }
                info!(
                    "stopped after {} images, {} cycle(s) started",
                    report.image_count, report.cycles_started
                );
                println!("\n\n{}\n", report.summary());
                report.exit_code()
            }
            Err(err) => {
                error!("{err:#}");
                ExitCode::from(capture::report::EXIT_RUNTIME_FAULT)
            }
        }
    })
}

/// Everything that can fail before the first tick: settings, output
/// directory and the pigpio daemon connection.
fn start_timelapse(cli: &Cli, controller: &mut CaptureController) -> Result<()> {
    let mut settings = TimelapseSettings::load(cli.settings.as_deref())?;
    settings.apply_env(
        std::env::var("PIGPIO_ADDR").ok(),
        std::env::var("PIGPIO_PORT").ok(),
    )?;
    let config = TimelapseConfig::resolve(cli, settings)?;

    prepare_output_dir(&config.output_dir, config.overlay.is_some())?;

    let driver = PigpioClient::connect(&config.light.daemon_host, config.light.daemon_port)?;
    let light = LightGuard::new(Box::new(driver), config.light.gpio);

    let camera: Arc<dyn Camera> = Arc::new(StillCamera::new(&config.camera));
    let overlay = config
        .overlay
        .as_ref()
        .map(|settings| Arc::new(ImageMagickOverlay::new(settings)) as Arc<dyn Overlay>);

    let capture_loop = CaptureLoop::new(
        config.loop_config.clone(),
        Arc::new(SystemClock),
        light,
        camera,
        overlay,
        config.output_dir.clone(),
    )
    .context("failed to set up the capture loop")?;

    controller.start(capture_loop)
}

async fn cancel_on_signal(cancel_token: CancellationToken) {
    match wait_for_shutdown_signal().await {
        Ok(signal) => info!("received {signal}, shutting down"),
        Err(err) => error!("signal handler failed, shutting down: {err}"),
    }
    cancel_token.cancel();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "Ctrl-C"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
}
