use anyhow::{Context, Result};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const LIGHT_OFF: u8 = 0;

/// PWM light output, e.g. a MOSFET-switched LED strip on a GPIO pin.
///
/// Calls may block on I/O; [`LightGuard`] runs them on the blocking pool.
pub trait LightDriver: Send {
    fn set_duty_cycle(&mut self, channel: u32, value: u8) -> Result<()>;

    /// Gives the underlying connection back. Called once, after the light is off.
    fn release(&mut self) -> Result<()>;
}

type SharedDriver = Arc<Mutex<Box<dyn LightDriver>>>;

/// Exclusive owner of one light channel.
///
/// Remembers the last level written so a steady level is not re-sent every
/// tick, and guarantees the channel ends at zero and the driver is released
/// exactly once, either through [`LightGuard::shutdown`] or on drop.
pub struct LightGuard {
    driver: SharedDriver,
    channel: u32,
    level: Option<u8>,
    released: bool,
}

impl LightGuard {
    pub fn new(driver: Box<dyn LightDriver>, channel: u32) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
            channel,
            level: None,
            released: false,
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub async fn set_level(&mut self, value: u8) -> Result<()> {
        if self.released {
            anyhow::bail!("light channel {} already released", self.channel);
        }
        if self.level == Some(value) {
            return Ok(());
        }

        // Unknown until the write succeeds.
        self.level = None;
        let channel = self.channel;
        self.on_driver(move |driver| driver.set_duty_cycle(channel, value))
            .await
            .with_context(|| format!("failed to set light channel {channel} to {value}"))?;
        self.level = Some(value);
        debug!("light channel {channel} set to {value}");
        Ok(())
    }

    pub async fn off(&mut self) -> Result<()> {
        self.set_level(LIGHT_OFF).await
    }

    /// Forces the light to zero and releases the driver. Later calls are no-ops.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let channel = self.channel;
        let result = self
            .on_driver(move |driver| switch_off_and_release(driver, channel))
            .await;
        if result.is_ok() {
            self.level = Some(LIGHT_OFF);
        }
        result
    }

    async fn on_driver<F>(&self, call: F) -> Result<()>
    where
        F: FnOnce(&mut dyn LightDriver) -> Result<()> + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        tokio::task::spawn_blocking(move || call(lock(&driver).as_mut()))
            .await
            .context("light driver task failed")?
    }
}

// A panic inside a driver call must not stop the light being switched off.
fn lock(driver: &SharedDriver) -> MutexGuard<'_, Box<dyn LightDriver>> {
    driver.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Zero is written unconditionally, the cached level may be stale.
fn switch_off_and_release(driver: &mut dyn LightDriver, channel: u32) -> Result<()> {
    let off = driver
        .set_duty_cycle(channel, LIGHT_OFF)
        .with_context(|| format!("failed to switch off light channel {channel}"));
    let release = driver.release().context("failed to release light driver");
    off.and(release)
}

impl Drop for LightGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!(
            "light channel {} dropped without shutdown, switching it off",
            self.channel
        );
        if let Err(err) = switch_off_and_release(lock(&self.driver).as_mut(), self.channel) {
            error!("light shutdown on drop failed: {err:#}");
        }
    }
}
