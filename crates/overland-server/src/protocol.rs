//! Messages exchanged between clients and the session server.
//!
//! Everything a client learns about the world arrives as [`UpdateRecord`]s
//! from its own outbox; the envelope here only adds joining and liveness.

use serde::{Deserialize, Serialize};

use overland_protocol::{Intent, IntentId, PlayerId, UpdateRecord};

/// Client-to-server messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Claim a seat, or reclaim one with the token from an earlier `Welcome`.
    Join {
        name: String,
        reconnect_token: Option<String>,
    },
    Submit { intent: Intent },
    Ping { timestamp: u64 },
}

/// Server-to-client messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Welcome { player: PlayerId, token: String },
    JoinRejected { reason: JoinRejectReason },
    /// Records from the player's outbox, in production order.
    Updates { records: Vec<UpdateRecord> },
    Rejected {
        intent: IntentId,
        reason: String,
        /// The same intent may succeed once the other party is free.
        retry: bool,
    },
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinRejectReason {
    TableFull,
    InvalidReconnectToken,
    AlreadyConnected,
}

pub fn serialize_client_message(msg: &ClientMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec(msg)
}

pub fn deserialize_client_message(data: &[u8]) -> Result<ClientMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}

pub fn serialize_server_message(msg: &ServerMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec(msg)
}

pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}
