pub mod config;
pub mod controller;
pub mod loop_worker;
pub mod report;
pub mod session;

pub use config::{FailurePolicy, LoopConfig, TickTiming};
pub use controller::CaptureController;
pub use loop_worker::CaptureLoop;
pub use report::{CaptureReport, StopReason};
pub use session::{prepare_output_dir, CaptureSession};
