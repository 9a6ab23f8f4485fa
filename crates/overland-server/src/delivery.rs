//! Last hop between the session and the transport.
//!
//! The session drains a player's outbox as soon as it hands the records to a
//! client, so the transport may still be holding updates for a client that
//! dropped before the session heard of it. Those records are kept here and
//! go out to the same seat right after its next `Welcome`, ahead of anything
//! the session flushes for the new connection.

use std::collections::HashMap;

use overland_protocol::{PlayerId, UpdateRecord};
use tracing::{debug, info, warn};

use crate::protocol::ServerMessage;
use crate::session::Outbound;

#[derive(Debug, Default)]
pub struct Courier {
    /// Which player each client was last welcomed as.
    seats: HashMap<u64, PlayerId>,
    stranded: HashMap<PlayerId, Vec<UpdateRecord>>,
}

impl Courier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records waiting for `player` to come back.
    pub fn stranded(&self, player: PlayerId) -> usize {
        self.stranded.get(&player).map_or(0, Vec::len)
    }

    /// What to put on the wire for one outbound message, in order.
    pub fn route(
        &mut self,
        outbound: Outbound,
        is_connected: impl Fn(u64) -> bool,
    ) -> Vec<(u64, ServerMessage)> {
        let Outbound { client_id, message } = outbound;
        let connected = is_connected(client_id);
        let mut out = Vec::new();

        match message {
            ServerMessage::Welcome { player, token } => {
                self.seats.retain(|_, p| *p != player);
                self.seats.insert(client_id, player);
                if !connected {
                    debug!(client_id, ?player, "welcome for a client that already left");
                    return out;
                }
                out.push((client_id, ServerMessage::Welcome { player, token }));
                if let Some(records) = self.stranded.remove(&player) {
                    info!(client_id, ?player, count = records.len(), "resending stranded updates");
                    out.push((client_id, ServerMessage::Updates { records }));
                }
            }
            ServerMessage::Updates { records } => {
                let Some(player) = self.seats.get(&client_id).copied() else {
                    warn!(client_id, count = records.len(), "updates for a client never welcomed");
                    return out;
                };
                if !connected {
                    warn!(client_id, ?player, count = records.len(), "client gone; holding updates");
                    self.stranded.entry(player).or_default().extend(records);
                    return out;
                }
                let records = match self.stranded.remove(&player) {
                    Some(mut held) => {
                        held.extend(records);
                        held
                    }
                    None => records,
                };
                out.push((client_id, ServerMessage::Updates { records }));
            }
            message if connected => out.push((client_id, message)),
            message => debug!(client_id, ?message, "dropping message for a gone client"),
        }
        out
    }
}
