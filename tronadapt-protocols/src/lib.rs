//! # tronadapt Protocol Codecs
//!
//! Wire formats for the two binary protocols spoken by the adapter runtime:
//! the virtual clock coordinator protocol and the tester's socket-adapter
//! protocol.

pub mod clock;
pub mod socket_adapter;
pub mod wire;

pub use clock::{ClockCommand, Reply};
pub use socket_adapter::{ChannelId, ConfigRequest, InboundFrame, ACK_BIT};
pub use wire::CodecError;
