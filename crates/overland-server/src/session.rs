//! The serialization point of a running session.
//!
//! One [`SessionActor`] owns the [`Game`]. Joins, disconnects, submitted
//! intents and planned automatic turns all arrive on its command channel and
//! are applied one at a time; outbound messages leave on a separate channel
//! the transport drains. Automatic combat turns are planned on the blocking
//! pool against a snapshot and come back as ordinary intents, so a slow
//! planner never stalls the other players.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use overland_core::{
    load_rules, AutoDrive, CombatPhase, CoreError, Game, IntentOutcome, MapShape, OverlandMap,
    PlayerSetup, RulesError, RulesSource, SideKind,
};
use overland_protocol::{
    CaptureDecision, CombatId, CombatOrder, Coordinate, Intent, IntentId, IntentKind, PlayerId,
    RejectionKind, TerrainKind,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::ConnectionManager;
use crate::protocol::ServerMessage;

/// Ids of intents the session submits on a player's behalf have this bit set.
pub const SERVER_INTENT_BIT: u64 = 1 << 63;

const COMMAND_QUEUE: usize = 1024;
const STAND_IN_PASSES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session has shut down")]
    Closed,

    #[error("failed to load rules: {0}")]
    Rules(#[from] RulesError),

    #[error("failed to set up the table: {0}")]
    Setup(#[from] CoreError),
}

/// A message for one client, in the order the session produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub client_id: u64,
    pub message: ServerMessage,
}

type Inspection = Box<dyn FnOnce(&Game) + Send>;

pub enum SessionCommand {
    Join {
        client_id: u64,
        name: String,
        reconnect_token: Option<String>,
    },
    Leave {
        client_id: u64,
    },
    Submit {
        client_id: u64,
        intent: Intent,
    },
    /// Periodic housekeeping: disconnect grace and stand-in play.
    Tick {
        now: Instant,
    },
    AutoPlanned {
        combat: CombatId,
        player: PlayerId,
        revision: u64,
        orders: Vec<CombatOrder>,
    },
    Inspect(Inspection),
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub disconnect_grace: Duration,
    pub outbox_warn_threshold: usize,
    pub auto_think_budget: Duration,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            disconnect_grace: config.disconnect_grace,
            outbox_warn_threshold: config.outbox_warn_threshold,
            auto_think_budget: config.auto_think_budget,
        }
    }
}

/// Cloneable front door to a running [`SessionActor`].
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(command).await.map_err(|_| SessionError::Closed)
    }

    pub async fn join(
        &self,
        client_id: u64,
        name: impl Into<String>,
        reconnect_token: Option<String>,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Join {
            client_id,
            name: name.into(),
            reconnect_token,
        })
        .await
    }

    pub async fn leave(&self, client_id: u64) -> Result<(), SessionError> {
        self.send(SessionCommand::Leave { client_id }).await
    }

    pub async fn submit(&self, client_id: u64, intent: Intent) -> Result<(), SessionError> {
        self.send(SessionCommand::Submit { client_id, intent }).await
    }

    pub async fn tick(&self, now: Instant) -> Result<(), SessionError> {
        self.send(SessionCommand::Tick { now }).await
    }

    /// Runs `f` against the game between two commands.
    pub async fn inspect<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        R: Send + 'static,
        F: FnOnce(&Game) -> R + Send + 'static,
    {
        let (reply, answer) = oneshot::channel();
        self.send(SessionCommand::Inspect(Box::new(move |game: &Game| {
            let _ = reply.send(f(game));
        })))
        .await?;
        answer.await.map_err(|_| SessionError::Closed)
    }
}

pub struct SessionActor {
    game: Game,
    connections: ConnectionManager,
    settings: SessionSettings,
    commands: mpsc::Receiver<SessionCommand>,
    requeue: mpsc::WeakSender<SessionCommand>,
    outbound: mpsc::UnboundedSender<Outbound>,
    ai_players: Vec<PlayerId>,
    /// (combat, revision) pairs with a planner running.
    planning: HashSet<(CombatId, u64)>,
    outbox_warned: HashSet<PlayerId>,
    next_server_intent: u64,
}

impl SessionActor {
    /// Starts the actor on the current runtime. Human seats become claimable;
    /// automatic combat turns are planned off the actor.
    pub fn spawn(
        game: Game,
        settings: SessionSettings,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<Outbound>,
        JoinHandle<()>,
    ) {
        let game = game.with_auto_drive(AutoDrive::Deferred);
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let players = game.world().players();
        let humans = players
            .iter()
            .filter(|p| !p.is_ai)
            .map(|p| (p.id, p.name.clone()))
            .collect();
        let ai_players = players.iter().filter(|p| p.is_ai).map(|p| p.id).collect();

        let actor = Self {
            connections: ConnectionManager::new(humans, settings.disconnect_grace),
            game,
            settings,
            commands,
            requeue: tx.downgrade(),
            outbound,
            ai_players,
            planning: HashSet::new(),
            outbox_warned: HashSet::new(),
            next_server_intent: 0,
        };
        let task = tokio::spawn(actor.run());
        (SessionHandle { tx }, outbound_rx, task)
    }

    async fn run(mut self) {
        info!(turn = self.game.turn(), "session started");
        self.after_command();
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
            self.after_command();
        }
        info!("session closed");
    }

    fn after_command(&mut self) {
        self.schedule_auto_turns();
        self.flush();
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join {
                client_id,
                name,
                reconnect_token,
            } => self.handle_join(client_id, &name, reconnect_token.as_deref()),
            SessionCommand::Leave { client_id } => {
                if let Some(player) = self.connections.disconnect(client_id) {
                    info!(?player, client_id, "player disconnected");
                }
            }
            SessionCommand::Submit { client_id, intent } => self.handle_submit(client_id, intent),
            SessionCommand::Tick { now } => self.handle_tick(now),
            SessionCommand::AutoPlanned {
                combat,
                player,
                revision,
                orders,
            } => {
                self.planning.remove(&(combat, revision));
                self.apply_for(
                    player,
                    IntentKind::AutoCombatOrders {
                        combat,
                        revision,
                        orders,
                    },
                );
            }
            SessionCommand::Inspect(f) => f(&self.game),
        }
    }

    fn handle_join(&mut self, client_id: u64, name: &str, reconnect_token: Option<&str>) {
        match self.connections.join(client_id, name, reconnect_token) {
            Ok((player, token)) => {
                info!(
                    ?player,
                    client_id,
                    reconnect = reconnect_token.is_some(),
                    backlog = self.game.pending_updates(player),
                    "player joined"
                );
                self.send(client_id, ServerMessage::Welcome { player, token });
            }
            Err(reason) => {
                info!(client_id, ?reason, "join rejected");
                self.send(client_id, ServerMessage::JoinRejected { reason });
            }
        }
    }

    fn handle_submit(&mut self, client_id: u64, intent: Intent) {
        let Some(player) = self.connections.player_of(client_id) else {
            warn!(client_id, "intent from a client without a seat");
            return;
        };
        let refusal = if intent.player != player {
            Some("intent names another player")
        } else if intent.id.0 & SERVER_INTENT_BIT != 0 {
            Some("intent id is reserved")
        } else {
            None
        };
        if let Some(reason) = refusal {
            warn!(?player, intent = ?intent.id, reason, "intent refused");
            self.send(
                client_id,
                ServerMessage::Rejected {
                    intent: intent.id,
                    reason: reason.to_string(),
                    retry: false,
                },
            );
            return;
        }

        match self.game.apply(intent) {
            IntentOutcome::Applied | IntentOutcome::Duplicate => {}
            IntentOutcome::Rejected(rejection) => self.send(
                client_id,
                ServerMessage::Rejected {
                    intent: rejection.intent,
                    retry: rejection.kind == RejectionKind::TryAgain,
                    reason: rejection.reason,
                },
            ),
        }
    }

    fn handle_tick(&mut self, now: Instant) {
        for player in self.connections.process_disconnections(now) {
            warn!(?player, "disconnect grace expired; playing on their behalf");
        }
        let absent: Vec<PlayerId> = self.connections.taken_over().collect();
        for player in absent {
            self.stand_in(player);
        }
    }

    /// Keeps an absent player from stalling anyone: accept fights offered to
    /// them, hand active ones to auto-control, capture what they win, and end
    /// their turn. Accepting a fight can activate it, hence the second pass.
    fn stand_in(&mut self, player: PlayerId) {
        for _ in 0..STAND_IN_PASSES {
            let moves = self.stand_in_moves(player);
            if moves.is_empty() {
                return;
            }
            for kind in moves {
                self.apply_for(player, kind);
            }
        }
    }

    fn stand_in_moves(&self, player: PlayerId) -> Vec<IntentKind> {
        let mut moves = Vec::new();
        for combat in self.game.combats().combats() {
            let Some(side) = combat.side_of(player) else {
                continue;
            };
            match combat.phase() {
                phase if phase.is_pending() => {
                    let busy = self.game.combats().fighting(player).is_some();
                    if side == SideKind::Defender && !combat.is_ready(player) && !busy {
                        moves.push(IntentKind::RequestCombat { combat: combat.id });
                    }
                }
                CombatPhase::Active if !combat.side(side).auto => {
                    moves.push(IntentKind::SetAutoControl {
                        combat: combat.id,
                        enabled: true,
                    });
                }
                CombatPhase::AwaitingDecision { decider } if decider == player => {
                    moves.push(IntentKind::DecideCapture {
                        combat: combat.id,
                        decision: CaptureDecision::Capture,
                    });
                }
                _ => {}
            }
        }
        if !self.game.has_ended_turn(player) {
            moves.push(IntentKind::EndTurn);
        }
        moves
    }

    fn apply_for(&mut self, player: PlayerId, kind: IntentKind) {
        self.next_server_intent += 1;
        let intent = Intent {
            id: IntentId(SERVER_INTENT_BIT | self.next_server_intent),
            player,
            kind,
        };
        if let IntentOutcome::Rejected(rejection) = self.game.apply(intent) {
            debug!(?player, reason = %rejection.reason, "server intent not applied");
        }
    }

    fn schedule_auto_turns(&mut self) {
        for job in self.game.auto_turn_jobs() {
            if !self.planning.insert((job.combat, job.revision)) {
                continue;
            }
            let Some(requeue) = self.requeue.upgrade() else {
                return;
            };
            let budget = self.settings.auto_think_budget;
            let (combat, player, revision) = (job.combat, job.player, job.revision);
            tokio::spawn(async move {
                let planner = tokio::task::spawn_blocking(move || job.plan());
                let orders = match tokio::time::timeout(budget, planner).await {
                    Ok(Ok(orders)) => orders,
                    Ok(Err(e)) => {
                        error!(%combat, error = %e, "auto-control planner failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(%combat, ?budget, "auto-control planning over budget; passing");
                        Vec::new()
                    }
                };
                let planned = SessionCommand::AutoPlanned {
                    combat,
                    player,
                    revision,
                    orders,
                };
                if requeue.send(planned).await.is_err() {
                    debug!(%combat, "session closed before planned turn arrived");
                }
            });
        }
    }

    /// Delivers each connected player's outbox; absent players' records wait.
    fn flush(&mut self) {
        let connected: Vec<(PlayerId, u64)> = self.connections.connected().collect();
        for (player, client_id) in connected {
            self.outbox_warned.remove(&player);
            let records = self.game.drain_outbox(player);
            if !records.is_empty() {
                debug!(?player, count = records.len(), "flushing updates");
                self.send(client_id, ServerMessage::Updates { records });
            }
        }

        let absent: Vec<PlayerId> = self.connections.absent().collect();
        for player in absent {
            let pending = self.game.pending_updates(player);
            if pending > self.settings.outbox_warn_threshold && self.outbox_warned.insert(player) {
                warn!(?player, pending, "outbox growing while player is away");
            }
        }

        for player in &self.ai_players {
            self.game.drain_outbox(*player);
        }
    }

    fn send(&self, client_id: u64, message: ServerMessage) {
        if self
            .outbound
            .send(Outbound { client_id, message })
            .is_err()
        {
            debug!(client_id, "outbound channel closed");
        }
    }
}

/// A fresh table from config: one settlement and a small stack per seat,
/// spread along the middle row of the surface plane.
pub fn build_game(config: &ServerConfig) -> Result<Game, SessionError> {
    let rules = match &config.rules_path {
        Some(path) => load_rules(RulesSource::Path(path.display().to_string()))?,
        None => load_rules(RulesSource::Embedded)?,
    };
    let shape = MapShape::new(
        config.map.width,
        config.map.height,
        config.map.planes,
        config.map.wrap_horizontal,
    );
    let map = OverlandMap::new(shape, TerrainKind::Grassland);
    let seats: Vec<PlayerSetup> = config
        .seats
        .iter()
        .map(|s| {
            if s.ai {
                PlayerSetup::ai(&s.name)
            } else {
                PlayerSetup::human(&s.name)
            }
        })
        .collect();

    let count = seats.len() as i64;
    let mut game = Game::new(rules, map, seats);
    let width = i64::from(config.map.width);
    let row = (config.map.height / 2) as i32;
    for (i, seat) in config.seats.iter().enumerate() {
        let player = PlayerId(i as u8);
        let x = ((i as i64 + 1) * width / (count + 1)) as i32;
        let home = Coordinate::new(x, row, 0);
        let mut w = game.writer();
        w.found_settlement(player, &format!("{}'s Hold", seat.name), home)?;
        w.spawn_unit(player, "spearmen", home)?;
        w.spawn_unit(player, "scouts", home)?;
    }
    game.check_invariants()
        .map_err(|e| SessionError::Setup(CoreError::Consistency(e)))?;
    info!(seats = count, turn = game.turn(), "table set");
    Ok(game)
}
