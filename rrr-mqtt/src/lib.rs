//! MQTT 3.1.1/5 protocol state machine shared by client and broker code:
//! packet types, property validation, the connection collection's per-tick
//! iteration budget, packet handlers, subscription matching, and a
//! pluggable session storage engine (§4.4).

pub mod codec;
pub mod connection;
pub mod err;
pub mod handler;
pub mod id;
pub mod msg_assurance;
pub mod packet;
pub mod properties;
pub mod qos;
pub mod session;
pub mod subscription;

pub use codec::{decode_packet, encode_packet};
pub use connection::{Connection, ConnectionCollection, ConnectionState, TickBudget, TickReport};
pub use err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind, SessionOutcome};
pub use handler::{handle_packet, HandleOutcome, ReasonCode};
pub use id::{IdGenType, IdGenerator};
pub use packet::{Packet, PacketType, ProtocolVersion};
pub use qos::{QosLevel, SubAckQos};
pub use session::{InMemorySessionEngine, Session, SessionStorageEngine};
pub use subscription::{Subscription, SubscriptionCollection};
