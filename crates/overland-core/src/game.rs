//! The serialization point: every intent enters here, is validated against
//! the submitting player's knowledge, and is applied to the true world.

use std::collections::{BTreeSet, HashMap, HashSet};

use overland_protocol::{
    CombatId, Coordinate, Intent, IntentId, IntentKind, PlayerId, Rejection, UpdateRecord, Urn,
};

use crate::combat::{AutoTurnJob, CombatOrchestrator, DamageResolver, FlatDamage};
use crate::error::{ConsistencyError, CoordinationError, CoreError, ValidationError};
use crate::map::OverlandMap;
use crate::memory::PlayerMemory;
use crate::movement::{compute_reachability, Reachability, StackProfile, TerrainKnowledge};
use crate::replication::ReplicationEngine;
use crate::rules::Rules;
use crate::world::{PlayerSetup, World, WorldWriter};

/// Upper bound on automatic combat turns played inside one intent.
const MAX_INLINE_AUTO_TURNS: usize = 10_000;

/// Result of submitting one intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    /// Same `(player, id)` was applied before; nothing happened.
    Duplicate,
    Rejected(Rejection),
}

impl IntentOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, IntentOutcome::Applied)
    }
}

/// Dispatch key for the handler table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntentTag {
    MoveStack,
    DismissUnit,
    SellBuilding,
    EndTurn,
    RequestCombat,
    WithdrawCombat,
    MoveCombatUnit,
    AttackCombatUnit,
    PassCombatUnit,
    EndCombatTurn,
    SetAutoControl,
    RetreatCombat,
    AutoCombatOrders,
    DecideCapture,
}

impl IntentTag {
    pub fn of(kind: &IntentKind) -> Self {
        match kind {
            IntentKind::MoveStack { .. } => IntentTag::MoveStack,
            IntentKind::DismissUnit { .. } => IntentTag::DismissUnit,
            IntentKind::SellBuilding { .. } => IntentTag::SellBuilding,
            IntentKind::EndTurn => IntentTag::EndTurn,
            IntentKind::RequestCombat { .. } => IntentTag::RequestCombat,
            IntentKind::WithdrawCombat { .. } => IntentTag::WithdrawCombat,
            IntentKind::MoveCombatUnit { .. } => IntentTag::MoveCombatUnit,
            IntentKind::AttackCombatUnit { .. } => IntentTag::AttackCombatUnit,
            IntentKind::PassCombatUnit { .. } => IntentTag::PassCombatUnit,
            IntentKind::EndCombatTurn { .. } => IntentTag::EndCombatTurn,
            IntentKind::SetAutoControl { .. } => IntentTag::SetAutoControl,
            IntentKind::RetreatCombat { .. } => IntentTag::RetreatCombat,
            IntentKind::AutoCombatOrders { .. } => IntentTag::AutoCombatOrders,
            IntentKind::DecideCapture { .. } => IntentTag::DecideCapture,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntentTag::MoveStack => "move_stack",
            IntentTag::DismissUnit => "dismiss_unit",
            IntentTag::SellBuilding => "sell_building",
            IntentTag::EndTurn => "end_turn",
            IntentTag::RequestCombat => "request_combat",
            IntentTag::WithdrawCombat => "withdraw_combat",
            IntentTag::MoveCombatUnit => "move_combat_unit",
            IntentTag::AttackCombatUnit => "attack_combat_unit",
            IntentTag::PassCombatUnit => "pass_combat_unit",
            IntentTag::EndCombatTurn => "end_combat_turn",
            IntentTag::SetAutoControl => "set_auto_control",
            IntentTag::RetreatCombat => "retreat_combat",
            IntentTag::AutoCombatOrders => "auto_combat_orders",
            IntentTag::DecideCapture => "decide_capture",
        }
    }
}

type Handler = fn(&mut Game, PlayerId, &IntentKind) -> Result<(), CoreError>;

/// Who plays automatic combat turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AutoDrive {
    /// Played to completion inside [`Game::apply`].
    #[default]
    Inline,
    /// Left to the caller: see [`Game::auto_turn_jobs`]. Orders come back as
    /// `AutoCombatOrders` intents.
    Deferred,
}

/// One session's authoritative state and the intent pipeline in front of it.
pub struct Game {
    world: World,
    replication: ReplicationEngine,
    combats: CombatOrchestrator,
    applied: HashSet<(PlayerId, IntentId)>,
    ended_turn: BTreeSet<PlayerId>,
    handlers: HashMap<IntentTag, Handler>,
    damage: Box<dyn DamageResolver>,
    auto_drive: AutoDrive,
}

impl Game {
    pub fn new(rules: Rules, map: OverlandMap, players: Vec<PlayerSetup>) -> Self {
        Self::from_world(World::new(rules, map, players))
    }

    pub fn from_world(world: World) -> Self {
        let replication = ReplicationEngine::new(&world);
        Self {
            world,
            replication,
            combats: CombatOrchestrator::new(),
            applied: HashSet::new(),
            ended_turn: BTreeSet::new(),
            handlers: default_handlers(),
            damage: Box::new(FlatDamage),
            auto_drive: AutoDrive::default(),
        }
    }

    pub fn with_damage(mut self, damage: Box<dyn DamageResolver>) -> Self {
        self.damage = damage;
        self
    }

    pub fn with_auto_drive(mut self, auto_drive: AutoDrive) -> Self {
        self.auto_drive = auto_drive;
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn combats(&self) -> &CombatOrchestrator {
        &self.combats
    }

    pub fn turn(&self) -> u32 {
        self.world.turn()
    }

    pub fn memory(&self, player: PlayerId) -> Option<&PlayerMemory> {
        self.replication.memory(player)
    }

    pub fn pending_updates(&self, player: PlayerId) -> usize {
        self.replication.pending(player)
    }

    pub fn drain_outbox(&mut self, player: PlayerId) -> Vec<UpdateRecord> {
        self.replication.drain_outbox(player)
    }

    pub fn has_ended_turn(&self, player: PlayerId) -> bool {
        self.ended_turn.contains(&player)
    }

    /// Direct world access for scenario setup. Changes replicate like any other.
    pub fn writer(&mut self) -> WorldWriter<'_> {
        self.world.writer(&mut self.replication)
    }

    /// Automatic combat turns waiting to be planned (deferred mode).
    pub fn auto_turn_jobs(&self) -> Vec<AutoTurnJob> {
        self.combats.pending_auto_turns()
    }

    /// Every cross-aggregate invariant: world references, memory soundness, combat enrollment.
    pub fn check_invariants(&self) -> Result<(), ConsistencyError> {
        self.world.check_invariants()?;
        self.replication.check_soundness(&self.world)?;
        self.combats.check_invariants(&self.world)
    }

    /// Applies one intent at most once.
    pub fn apply(&mut self, intent: Intent) -> IntentOutcome {
        let Intent { id, player, kind } = intent;
        if self.applied.contains(&(player, id)) {
            tracing::debug!(?player, ?id, "duplicate intent ignored");
            return IntentOutcome::Duplicate;
        }
        let tag = IntentTag::of(&kind);

        let result = self.dispatch(tag, player, &kind);
        match result {
            Ok(()) => {
                self.applied.insert((player, id));
                self.after_intent();
                tracing::debug!(?player, ?id, intent = tag.name(), "intent applied");
                IntentOutcome::Applied
            }
            Err(error) => {
                if error.is_consistency() {
                    tracing::error!(?player, ?id, intent = tag.name(), %error, "intent aborted");
                } else {
                    tracing::warn!(?player, ?id, intent = tag.name(), %error, "intent rejected");
                }
                IntentOutcome::Rejected(Rejection {
                    intent: id,
                    kind: error.rejection_kind(),
                    reason: error.to_string(),
                })
            }
        }
    }

    fn dispatch(
        &mut self,
        tag: IntentTag,
        player: PlayerId,
        kind: &IntentKind,
    ) -> Result<(), CoreError> {
        let seated = self.world.player(player).is_some_and(|p| p.alive);
        let neutral_auto = player.is_neutral() && tag == IntentTag::AutoCombatOrders;
        if !seated && !neutral_auto {
            return Err(ValidationError::UnknownPlayer(player).into());
        }
        let handler = *self
            .handlers
            .get(&tag)
            .ok_or(ConsistencyError::MisroutedIntent(tag.name()))?;
        handler(self, player, kind)
    }

    fn after_intent(&mut self) {
        let mut w = self.world.writer(&mut self.replication);
        let pruned = self.combats.prune_orphaned(&mut w);
        if !pruned.is_empty() {
            tracing::info!(?pruned, "orphaned combats withdrawn");
        }
        if self.auto_drive == AutoDrive::Inline {
            self.drive_auto_inline();
        }
    }

    fn drive_auto_inline(&mut self) {
        for _ in 0..MAX_INLINE_AUTO_TURNS {
            let jobs = self.combats.pending_auto_turns();
            if jobs.is_empty() {
                return;
            }
            for job in jobs {
                let orders = job.plan();
                let mut w = self.world.writer(&mut self.replication);
                let result = self.combats.apply_auto_orders(
                    &mut w,
                    job.combat,
                    job.player,
                    job.revision,
                    &orders,
                    &mut *self.damage,
                );
                match result {
                    Ok(()) | Err(CoreError::Coordination(CoordinationError::StaleDecision { .. })) => {}
                    Err(error) => {
                        tracing::error!(combat = %job.combat, %error, "automatic turn failed");
                        return;
                    }
                }
            }
        }
        tracing::warn!("automatic combat turns did not settle");
    }

    fn process_turn(&mut self) {
        let mut w = self.world.writer(&mut self.replication);

        let effects: Vec<_> = w
            .world()
            .effects()
            .filter(|(_, e)| e.upkeep > 0 && !e.caster.is_neutral())
            .map(|(id, e)| (id, e.caster, e.upkeep))
            .collect();
        for (id, caster, upkeep) in effects {
            let gold = w.world().player(caster).map_or(0, |p| p.gold);
            if gold >= upkeep {
                w.adjust_gold(caster, -upkeep);
            } else {
                tracing::info!(?caster, effect = ?id, "upkeep unpaid; effect dispelled");
                if let Err(error) = w.remove_effect(id) {
                    tracing::error!(%error, "removing unpaid effect failed");
                }
            }
        }

        w.reset_turn_budgets();

        let towns: Vec<Urn> = w.world().settlements().map(|(urn, _)| urn).collect();
        for urn in towns {
            match w.advance_construction(urn) {
                Ok(done) if !done.is_empty() => {
                    tracing::info!(settlement = %urn, ?done, "construction completed");
                }
                Ok(_) => {}
                Err(error) => tracing::error!(settlement = %urn, %error, "construction failed"),
            }
        }

        let turn = w.advance_turn();
        self.replication.refresh_all(&self.world);
        self.ended_turn.clear();
        tracing::info!(turn, "turn processed");
    }
}

fn default_handlers() -> HashMap<IntentTag, Handler> {
    let table: [(IntentTag, Handler); 14] = [
        (IntentTag::MoveStack, move_stack),
        (IntentTag::DismissUnit, dismiss_unit),
        (IntentTag::SellBuilding, sell_building),
        (IntentTag::EndTurn, end_turn),
        (IntentTag::RequestCombat, request_combat),
        (IntentTag::WithdrawCombat, withdraw_combat),
        (IntentTag::MoveCombatUnit, move_combat_unit),
        (IntentTag::AttackCombatUnit, attack_combat_unit),
        (IntentTag::PassCombatUnit, pass_combat_unit),
        (IntentTag::EndCombatTurn, end_combat_turn),
        (IntentTag::SetAutoControl, set_auto_control),
        (IntentTag::RetreatCombat, retreat_combat),
        (IntentTag::AutoCombatOrders, auto_combat_orders),
        (IntentTag::DecideCapture, decide_capture),
    ];
    table.into_iter().collect()
}

fn misrouted(tag: IntentTag) -> CoreError {
    ConsistencyError::MisroutedIntent(tag.name()).into()
}

/// Validates a stack move against the player's memory, then walks it through the true world.
///
/// The walk halts early when the world disagrees with what the player knew;
/// running into something hostile schedules a combat from the last cell reached.
fn move_stack(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::MoveStack { units, to } = kind else {
        return Err(misrouted(IntentTag::MoveStack));
    };
    let units: Vec<Urn> = units.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let from = stack_location(&game.world, &game.combats, player, &units)?;
    let to = game
        .world
        .shape()
        .normalize(*to)
        .ok_or(ValidationError::OffMap(*to))?;
    if to == from {
        return Err(ValidationError::AlreadyThere(to).into());
    }
    if let Some(pending) = game.combats.decision_pending_at(to) {
        return Err(CoordinationError::DecisionPending(pending).into());
    }

    let profile = StackProfile::from_world(&game.world, &units)?;
    let budget = profile.budget();
    let memory = game
        .replication
        .memory(player)
        .ok_or(ValidationError::UnknownPlayer(player))?;
    let plan = compute_reachability(game.world.rules(), &profile, from, budget, memory);
    let target = plan.get(to).filter(|cell| {
        cell.class == Reachability::ReachableThisTurn
            || (cell.class == Reachability::ReachableButTriggersEncounter && cell.within_budget)
    });
    if target.is_none() {
        return Err(ValidationError::Unreachable(to).into());
    }
    let path = plan
        .path_to(to)
        .ok_or(ValidationError::Unreachable(to))?;

    let limit = game.world.rules().stack_limit;
    let mut w = game.world.writer(&mut game.replication);
    let mut here = from;
    let mut spent = 0;
    for next in path.into_iter().skip(1) {
        let world = w.world();
        if let Some(pending) = game.combats.decision_pending_at(next) {
            tracing::debug!(?player, ?next, combat = %pending, "cell awaits a capture decision; stack halts");
            break;
        }
        if world.is_hostile_to(player, next) {
            let combat = game.combats.schedule(&mut w, player, &units, here, next)?;
            tracing::info!(?player, %combat, ?here, ?next, "stack ran into an encounter");
            return Ok(());
        }
        let Some(cost) = world
            .terrain(next)
            .and_then(|t| profile.entry_cost(world.rules(), t, TerrainKnowledge::road(world, next)))
        else {
            tracing::debug!(?player, ?next, "path blocked by terrain; stack halts");
            break;
        };
        let crowd = world.friendly_units(player, next) + units.len();
        if crowd > limit || spent + cost > budget.remaining {
            tracing::debug!(?player, ?next, crowd, spent, "stack halts short of its target");
            break;
        }
        for urn in &units {
            w.move_unit(*urn, next, cost)?;
        }
        spent += cost;
        here = next;
    }
    tracing::debug!(?player, ?from, reached = ?here, ?to, "stack moved");
    Ok(())
}

/// Common location of a stack the player may move.
fn stack_location(
    world: &World,
    combats: &CombatOrchestrator,
    player: PlayerId,
    units: &[Urn],
) -> Result<Coordinate, CoreError> {
    let mut location = None;
    for urn in units {
        let unit = world.unit(*urn).ok_or(ValidationError::UnknownUnit(*urn))?;
        if unit.owner != player {
            return Err(ValidationError::NotYourUnit(*urn).into());
        }
        if !unit.is_on_map() {
            return Err(ValidationError::UnitNotAlive(*urn).into());
        }
        if unit.combat.is_some() {
            return Err(ValidationError::UnitInCombat(*urn).into());
        }
        if let Some(combat) = combats.awaiting_decision(*urn) {
            return Err(CoordinationError::DecisionPending(combat).into());
        }
        match location {
            None => location = Some(unit.location),
            Some(at) if at != unit.location => {
                return Err(ValidationError::StackNotTogether.into())
            }
            Some(_) => {}
        }
    }
    location.ok_or_else(|| ValidationError::EmptyStack.into())
}

fn dismiss_unit(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::DismissUnit { unit } = kind else {
        return Err(misrouted(IntentTag::DismissUnit));
    };
    stack_location(&game.world, &game.combats, player, &[*unit])?;
    game.writer().dismiss_unit(*unit)
}

fn sell_building(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::SellBuilding {
        settlement,
        building,
    } = kind
    else {
        return Err(misrouted(IntentTag::SellBuilding));
    };
    let town = game
        .world
        .settlement(*settlement)
        .ok_or(ValidationError::UnknownSettlement(*settlement))?;
    if town.owner != player {
        return Err(ValidationError::NotYourSettlement(*settlement).into());
    }
    if !town.has_completed(building) {
        return Err(ValidationError::UnknownBuilding(building.clone()).into());
    }
    let value = game.writer().sell_building(*settlement, building)?;
    tracing::info!(?player, settlement = %settlement, %building, value, "building sold");
    Ok(())
}

/// Marks the player done; the turn advances once every human has ended theirs.
fn end_turn(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    if !matches!(kind, IntentKind::EndTurn) {
        return Err(misrouted(IntentTag::EndTurn));
    }
    if !game.ended_turn.insert(player) {
        return Err(ValidationError::TurnAlreadyEnded.into());
    }
    let waiting = game
        .world
        .players()
        .iter()
        .filter(|p| p.alive && !p.is_ai && !game.ended_turn.contains(&p.id))
        .count();
    if waiting == 0 {
        game.process_turn();
    }
    Ok(())
}

fn combat_id(kind: &IntentKind) -> Option<CombatId> {
    match kind {
        IntentKind::RequestCombat { combat }
        | IntentKind::WithdrawCombat { combat }
        | IntentKind::MoveCombatUnit { combat, .. }
        | IntentKind::AttackCombatUnit { combat, .. }
        | IntentKind::PassCombatUnit { combat, .. }
        | IntentKind::EndCombatTurn { combat }
        | IntentKind::SetAutoControl { combat, .. }
        | IntentKind::RetreatCombat { combat }
        | IntentKind::AutoCombatOrders { combat, .. }
        | IntentKind::DecideCapture { combat, .. } => Some(*combat),
        _ => None,
    }
}

fn request_combat(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let id = combat_id(kind).ok_or_else(|| misrouted(IntentTag::RequestCombat))?;
    let mut w = game.world.writer(&mut game.replication);
    game.combats.request(&mut w, id, player)
}

fn withdraw_combat(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let id = combat_id(kind).ok_or_else(|| misrouted(IntentTag::WithdrawCombat))?;
    let mut w = game.world.writer(&mut game.replication);
    game.combats.withdraw(&mut w, id, player)
}

fn move_combat_unit(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::MoveCombatUnit { combat, unit, to } = kind else {
        return Err(misrouted(IntentTag::MoveCombatUnit));
    };
    let mut w = game.world.writer(&mut game.replication);
    game.combats.move_unit(&mut w, *combat, player, *unit, *to)
}

fn attack_combat_unit(
    game: &mut Game,
    player: PlayerId,
    kind: &IntentKind,
) -> Result<(), CoreError> {
    let IntentKind::AttackCombatUnit {
        combat,
        attacker,
        target,
    } = kind
    else {
        return Err(misrouted(IntentTag::AttackCombatUnit));
    };
    let mut w = game.world.writer(&mut game.replication);
    game.combats.attack(
        &mut w,
        *combat,
        player,
        *attacker,
        *target,
        &mut *game.damage,
    )
}

fn pass_combat_unit(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::PassCombatUnit { combat, unit } = kind else {
        return Err(misrouted(IntentTag::PassCombatUnit));
    };
    game.combats.pass_unit(*combat, player, *unit)
}

fn end_combat_turn(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let id = combat_id(kind).ok_or_else(|| misrouted(IntentTag::EndCombatTurn))?;
    let mut w = game.world.writer(&mut game.replication);
    game.combats.end_turn(&mut w, id, player)
}

fn set_auto_control(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::SetAutoControl { combat, enabled } = kind else {
        return Err(misrouted(IntentTag::SetAutoControl));
    };
    game.combats.set_auto_control(*combat, player, *enabled)
}

fn retreat_combat(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let id = combat_id(kind).ok_or_else(|| misrouted(IntentTag::RetreatCombat))?;
    let mut w = game.world.writer(&mut game.replication);
    game.combats.retreat(&mut w, id, player)
}

fn auto_combat_orders(
    game: &mut Game,
    player: PlayerId,
    kind: &IntentKind,
) -> Result<(), CoreError> {
    let IntentKind::AutoCombatOrders {
        combat,
        revision,
        orders,
    } = kind
    else {
        return Err(misrouted(IntentTag::AutoCombatOrders));
    };
    let mut w = game.world.writer(&mut game.replication);
    game.combats.apply_auto_orders(
        &mut w,
        *combat,
        player,
        *revision,
        orders,
        &mut *game.damage,
    )
}

fn decide_capture(game: &mut Game, player: PlayerId, kind: &IntentKind) -> Result<(), CoreError> {
    let IntentKind::DecideCapture { combat, decision } = kind else {
        return Err(misrouted(IntentTag::DecideCapture));
    };
    let mut w = game.world.writer(&mut game.replication);
    game.combats.decide_capture(&mut w, *combat, player, *decision)
}
