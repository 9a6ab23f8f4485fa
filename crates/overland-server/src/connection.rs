//! Seat claims, disconnects and reconnection tokens.
//!
//! A seat keeps its player id for the whole session. While nobody holds it
//! the game keeps filling that player's outbox; whoever presents the seat's
//! token later receives everything that accumulated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use overland_protocol::PlayerId;
use rand::Rng;

use crate::protocol::JoinRejectReason;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nobody has claimed the seat yet.
    Open,
    Connected { client_id: u64, since: Instant },
    Disconnected { since: Instant },
    /// Grace ran out; the player's fights are under auto-control.
    TakenOver { since: Instant },
}

#[derive(Clone, Debug)]
pub struct Seat {
    pub player: PlayerId,
    pub name: String,
    pub state: ConnectionState,
    token: String,
}

/// Maps renet clients onto human seats.
pub struct ConnectionManager {
    seats: Vec<Seat>,
    clients: HashMap<u64, PlayerId>,
    disconnect_grace: Duration,
}

impl ConnectionManager {
    /// `humans` are the player ids clients may claim, with their seat names.
    pub fn new(humans: Vec<(PlayerId, String)>, disconnect_grace: Duration) -> Self {
        let seats = humans
            .into_iter()
            .map(|(player, name)| Seat {
                player,
                name,
                state: ConnectionState::Open,
                token: generate_reconnect_token(),
            })
            .collect();
        Self {
            seats,
            clients: HashMap::new(),
            disconnect_grace,
        }
    }

    pub fn seat(&self, player: PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player == player)
    }

    pub fn player_of(&self, client_id: u64) -> Option<PlayerId> {
        self.clients.get(&client_id).copied()
    }

    pub fn client_of(&self, player: PlayerId) -> Option<u64> {
        match self.seat(player)?.state {
            ConnectionState::Connected { client_id, .. } => Some(client_id),
            _ => None,
        }
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.client_of(player).is_some()
    }

    pub fn connected(&self) -> impl Iterator<Item = (PlayerId, u64)> + '_ {
        self.seats.iter().filter_map(|s| match s.state {
            ConnectionState::Connected { client_id, .. } => Some((s.player, client_id)),
            _ => None,
        })
    }

    /// Seats whose owner is away, connected before or not.
    pub fn absent(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.seats
            .iter()
            .filter(|s| !matches!(s.state, ConnectionState::Connected { .. }))
            .map(|s| s.player)
    }

    pub fn taken_over(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.seats
            .iter()
            .filter(|s| matches!(s.state, ConnectionState::TakenOver { .. }))
            .map(|s| s.player)
    }

    /// Claims a seat. With a token, only the seat it was issued for; without,
    /// the open seat whose name matches, else the first open seat.
    pub fn join(
        &mut self,
        client_id: u64,
        name: &str,
        reconnect_token: Option<&str>,
    ) -> Result<(PlayerId, String), JoinRejectReason> {
        let index = match reconnect_token {
            Some(token) => {
                let index = self
                    .seats
                    .iter()
                    .position(|s| s.token == token)
                    .ok_or(JoinRejectReason::InvalidReconnectToken)?;
                if matches!(self.seats[index].state, ConnectionState::Connected { .. }) {
                    return Err(JoinRejectReason::AlreadyConnected);
                }
                index
            }
            None => {
                let open = |s: &Seat| s.state == ConnectionState::Open;
                self.seats
                    .iter()
                    .position(|s| open(s) && s.name == name)
                    .or_else(|| self.seats.iter().position(open))
                    .ok_or(JoinRejectReason::TableFull)?
            }
        };

        let seat = &mut self.seats[index];
        seat.state = ConnectionState::Connected {
            client_id,
            since: Instant::now(),
        };
        if reconnect_token.is_none() {
            seat.name = name.to_string();
        }
        self.clients.insert(client_id, seat.player);
        Ok((seat.player, seat.token.clone()))
    }

    pub fn disconnect(&mut self, client_id: u64) -> Option<PlayerId> {
        let player = self.clients.remove(&client_id)?;
        let seat = self.seats.iter_mut().find(|s| s.player == player)?;
        seat.state = ConnectionState::Disconnected {
            since: Instant::now(),
        };
        Some(player)
    }

    /// Moves seats whose grace has expired to [`ConnectionState::TakenOver`]
    /// and returns their players.
    pub fn process_disconnections(&mut self, now: Instant) -> Vec<PlayerId> {
        let grace = self.disconnect_grace;
        let mut expired = Vec::new();
        for seat in &mut self.seats {
            if let ConnectionState::Disconnected { since } = seat.state {
                if now.duration_since(since) >= grace {
                    seat.state = ConnectionState::TakenOver { since: now };
                    expired.push(seat.player);
                }
            }
        }
        expired
    }
}

fn generate_reconnect_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
