pub mod clock;
pub mod phase;

pub use clock::{Clock, SystemClock};
pub use phase::{Phase, PhaseScheduler, CYCLE_HOURS};
