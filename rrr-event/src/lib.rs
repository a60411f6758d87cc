//! Event-loop dispatcher: per-function signal counters, a periodic timer,
//! and pause/resume back-pressure multiplexed over an `mio` reactor (§4.3).

pub mod err;
pub mod queue;

pub use err::{DispatchError, DispatchErrorKind};
pub use queue::{DispatchOutcome, EventQueue, FUNCTION_MAX};
