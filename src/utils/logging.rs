//! Logger setup and per-module switchable logging macros.
//!
//! A module opts in by defining the flag and importing the macros, which are
//! exported at the crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_info!("light period begins {}", now);
//! ```

use log::LevelFilter;

/// `PILAPSE_DEBUG=1` (or `true`) turns on debug output like `--verbose`.
pub fn debug_requested(verbose: bool, env_value: Option<&str>) -> bool {
    verbose
        || env_value
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// Installs `env_logger`. `RUST_LOG` still overrides the level chosen here.
pub fn init(verbose: bool) {
    let env_value = std::env::var("PILAPSE_DEBUG").ok();
    let level = if debug_requested(verbose, env_value.as_deref()) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
