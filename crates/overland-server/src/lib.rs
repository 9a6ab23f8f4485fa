//! Overland session server
//!
//! Hosts one authoritative game over renet. All game state lives in the
//! session actor; the transport only moves envelopes.

pub mod channels;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod protocol;
pub mod session;
pub mod transport;

pub use channels::*;
pub use config::{ConfigError, ServerConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use delivery::Courier;
pub use protocol::*;
pub use session::{build_game, Outbound, SessionActor, SessionError, SessionHandle, SessionSettings};
pub use transport::{ServerRunner, TransportConfig, TransportError, PROTOCOL_ID};
