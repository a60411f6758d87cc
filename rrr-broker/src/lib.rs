//! Ref-counted message holders and the slot/FIFO-backed customer broker
//! that routes them between instance threads (§4.2).

pub mod broker;
pub mod fifo;
pub mod holder;
pub mod slot;

pub use broker::{Broker, Customer, RatelimitParams, RATELIMIT_RELEASE, RATELIMIT_THRESHOLD};
pub use fifo::FifoBuffer;
pub use holder::{MessageHolder, Protocol};
pub use slot::SlotBuffer;
