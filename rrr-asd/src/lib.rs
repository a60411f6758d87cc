//! UDP-stream reliability layer (ASD — Acknowledged Stream Delivery, §4.5):
//! message-id-keyed outbound send queues, inbound release queues with
//! delivery-grace windows, and connect management, layered on top of an
//! underlying datagram stream the caller supplies through [`Transport`].

pub mod connect;
pub mod err;
pub mod frame;
pub mod params;
pub mod release_queue;
pub mod send_queue;
pub mod stream;

pub use connect::{ConnectAttempt, ConnectManager};
pub use err::{AsdError, AsdErrorKind};
pub use frame::{ConnectHandle, ControlFrame, CACK, DACK, MSG, RACK, RST};
pub use params::AsdParams;
pub use release_queue::{ReleaseQueue, ReleaseQueueCollection};
pub use send_queue::{MessageIdGenerator, SendAction, SendQueue};
pub use stream::{AsdStream, TickReport, Transport};
