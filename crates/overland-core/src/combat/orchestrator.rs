use std::collections::{BTreeMap, BTreeSet};

use overland_protocol::{
    CaptureDecision, CombatId, CombatOrder, CombatPos, CombatSummary, Coordinate, PlayerId,
    TerrainKind, UpdateRecord, Urn,
};

use crate::combat::{
    resolution, AutoTurnJob, Combat, CombatGrid, CombatPhase, Combatant, DamageResolver,
    EndReason, PhaseEvent, Side, SideKind,
};
use crate::error::{ConsistencyError, CoordinationError, CoreError, ValidationError};
use crate::movement::{compute_combat_reachability, Reachability};
use crate::unit::CombatSlot;
use crate::world::{World, WorldWriter};

/// Owns every scheduled combat and which players are currently fighting.
///
/// A player takes part in at most one `Active` combat. Requests that would
/// break that are held and promoted once the busy player's fight concludes.
#[derive(Clone, Debug, Default)]
pub struct CombatOrchestrator {
    combats: BTreeMap<CombatId, Combat>,
    next_id: u32,
    fighting: BTreeMap<PlayerId, CombatId>,
}

impl CombatOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn combat(&self, id: CombatId) -> Option<&Combat> {
        self.combats.get(&id)
    }

    pub fn combats(&self) -> impl Iterator<Item = &Combat> {
        self.combats.values()
    }

    /// The active combat `player` is fighting, if any.
    pub fn fighting(&self, player: PlayerId) -> Option<CombatId> {
        self.fighting.get(&player).copied()
    }

    /// Scheduled combats involving `player` that have not started yet.
    pub fn pending_for(&self, player: PlayerId) -> Vec<CombatId> {
        self.combats
            .values()
            .filter(|c| c.phase.is_pending() && c.side_of(player).is_some())
            .map(|c| c.id)
            .collect()
    }

    /// The combat won at `at` whose winner has not yet decided the settlement's fate.
    pub fn decision_pending_at(&self, at: Coordinate) -> Option<CombatId> {
        self.combats
            .values()
            .find(|c| c.at == at && matches!(c.phase, CombatPhase::AwaitingDecision { .. }))
            .map(|c| c.id)
    }

    /// Surviving attackers stay committed until their side's capture decision is in.
    pub fn awaiting_decision(&self, urn: Urn) -> Option<CombatId> {
        self.combats
            .values()
            .filter(|c| matches!(c.phase, CombatPhase::AwaitingDecision { .. }))
            .find(|c| {
                c.combatant(urn)
                    .is_some_and(|f| f.side == SideKind::Attacker && f.alive)
            })
            .map(|c| c.id)
    }

    fn get(&self, id: CombatId) -> Result<&Combat, ValidationError> {
        self.combats.get(&id).ok_or(ValidationError::UnknownCombat(id))
    }

    fn get_mut(&mut self, id: CombatId) -> Result<&mut Combat, ValidationError> {
        self.combats
            .get_mut(&id)
            .ok_or(ValidationError::UnknownCombat(id))
    }

    /// Records a fight between `units` standing at `from` and whatever holds `at`.
    ///
    /// Nothing moves: the attacking stack waits on `from` until the combat is fought.
    pub fn schedule(
        &mut self,
        w: &mut WorldWriter<'_>,
        attacker: PlayerId,
        units: &[Urn],
        from: Coordinate,
        at: Coordinate,
    ) -> Result<CombatId, CoreError> {
        if let Some(pending) = self.decision_pending_at(at) {
            return Err(CoordinationError::DecisionPending(pending).into());
        }
        let world = w.world();
        let settlement = world
            .settlement_at(at)
            .filter(|(_, s)| s.owner != attacker)
            .map(|(urn, s)| (urn, s.owner));
        let first_enemy = world
            .units_at(at)
            .into_iter()
            .find(|(_, u)| u.owner != attacker)
            .map(|(_, u)| u.owner);
        let hazard = world.hazard_at(at).is_some();
        let defender = match (settlement, first_enemy) {
            (Some((_, owner)), _) => owner,
            (None, Some(owner)) => owner,
            (None, None) if hazard => PlayerId::NEUTRAL,
            (None, None) => return Err(ValidationError::NothingToFight(at).into()),
        };
        if units.is_empty() {
            return Err(ValidationError::EmptyStack.into());
        }

        self.next_id += 1;
        let id = CombatId(self.next_id);
        let combat = Combat {
            id,
            phase: CombatPhase::Queued,
            from,
            at,
            attacker: Side {
                player: attacker,
                ai: world.is_ai(attacker),
                auto: false,
                roster: units.to_vec(),
            },
            defender: Side {
                player: defender,
                ai: world.is_ai(defender),
                auto: false,
                roster: defender_roster(world, defender, at),
            },
            settlement: settlement.map(|(urn, _)| urn),
            hazard,
            grid: None,
            combatants: BTreeMap::new(),
            ready: BTreeSet::new(),
            held_on: None,
            turn: 0,
            current: SideKind::Attacker,
            revision: 0,
            winner: None,
            end: None,
            summary: CombatSummary::default(),
        };
        tracing::info!(combat = %id, ?attacker, ?defender, ?from, ?at, "combat scheduled");
        announce(
            w,
            &combat,
            UpdateRecord::CombatScheduled {
                combat: id,
                attacker,
                defender: (!defender.is_neutral()).then_some(defender),
                from,
                at,
            },
        );
        let ai_attacker = combat.attacker.ai;
        self.combats.insert(id, combat);

        // AI attackers are ready the moment they commit.
        if ai_attacker {
            self.try_activate(w, id)?;
        }
        Ok(id)
    }

    /// `player` signals readiness. The combat starts once both sides are ready and free.
    pub fn request(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        if combat.phase.is_over() {
            return Err(ValidationError::CombatOver(id).into());
        }
        if combat.side_of(player).is_none() {
            return Err(ValidationError::NotAParticipant.into());
        }
        if !combat.phase.is_pending() {
            return Err(ValidationError::WrongPhase {
                phase: combat.phase,
                action: "request",
            }
            .into());
        }
        if combat.is_ready(player) {
            return Err(ValidationError::AlreadyRequested.into());
        }
        if let Some(busy) = self.fighting(player) {
            return Err(CoordinationError::AlreadyFighting(player, busy).into());
        }

        let combat = self.get_mut(id)?;
        combat.phase = combat.phase.transition(PhaseEvent::Request { by: player })?;
        combat.ready.insert(player);
        combat.bump();
        tracing::info!(combat = %id, ?player, "combat requested");
        let notice = UpdateRecord::CombatRequested { combat: id, by: player };
        announce(w, combat, notice);

        self.try_activate(w, id)?;
        Ok(())
    }

    /// Starts the combat if both sides are ready and nobody is busy elsewhere.
    ///
    /// While a seated player is fighting another combat the request is held;
    /// once they are free the hold lifts and the combat starts as soon as
    /// both sides are ready.
    fn try_activate(&mut self, w: &mut WorldWriter<'_>, id: CombatId) -> Result<bool, CoreError> {
        let combat = self.get(id)?;
        if !combat.phase.is_pending() {
            return Ok(false);
        }
        let busy = combat
            .players()
            .find(|p| self.fighting.get(p).is_some_and(|other| *other != id));
        let ready = |side: &Side| side.is_automatic() || combat.ready.contains(&side.player);
        let both_ready = ready(&combat.attacker) && ready(&combat.defender);

        let combat = self.get_mut(id)?;
        if let Some(waiting_on) = busy {
            if combat.held_on != Some(waiting_on) {
                combat.held_on = Some(waiting_on);
                tracing::warn!(combat = %id, ?waiting_on, "combat held until opponent is free");
                announce(w, combat, UpdateRecord::CombatHeld { combat: id, waiting_on });
            }
            return Ok(false);
        }
        if let Some(freed) = combat.held_on.take() {
            tracing::info!(combat = %id, ?freed, "hold lifted");
            if let CombatPhase::Requested { by } = combat.phase {
                announce(w, combat, UpdateRecord::CombatRequested { combat: id, by });
            }
        }
        if !both_ready {
            return Ok(false);
        }
        self.activate(w, id)?;
        Ok(true)
    }

    fn activate(&mut self, w: &mut WorldWriter<'_>, id: CombatId) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let world = w.world();
        let attackers = attacker_roster(world, combat);
        let defenders = defender_roster(world, combat.defender.player, combat.at);
        let settlement = combat
            .settlement
            .and_then(|urn| world.settlement(urn).map(|s| (urn, s)))
            .filter(|(_, s)| s.owner == combat.defender.player);
        let contested =
            settlement.is_some() || (combat.hazard && world.hazard_at(combat.at).is_some());

        if attackers.is_empty() || (defenders.is_empty() && !contested) {
            tracing::info!(combat = %id, "nothing left to fight at activation");
            return self.withdraw_now(w, id);
        }

        let rules = world.rules();
        let walls = settlement.is_some_and(|(_, s)| s.has_walls(rules));
        let terrain = world
            .map()
            .terrain(combat.at)
            .unwrap_or(TerrainKind::Grassland);
        let grid = CombatGrid::generate(&rules.combat, terrain, walls);
        let mut combatants = BTreeMap::new();
        for (side, roster) in [(SideKind::Attacker, &attackers), (SideKind::Defender, &defenders)] {
            for (urn, pos) in roster.iter().zip(grid.deployment(side, roster.len())) {
                if let Some(unit) = world.unit(*urn) {
                    combatants.insert(
                        *urn,
                        Combatant {
                            urn: *urn,
                            side,
                            pos,
                            hit_points: unit.hit_points,
                            max_hit_points: unit.max_hit_points,
                            attack: unit.attack,
                            defense: unit.defense,
                            moves_left: unit.moves_per_turn,
                            moves_per_turn: unit.moves_per_turn,
                            flying: unit.abilities.flying,
                            hero: unit.hero,
                            acted: false,
                            alive: true,
                        },
                    );
                }
            }
        }

        let combat = self
            .combats
            .get_mut(&id)
            .ok_or(ValidationError::UnknownCombat(id))?;
        combat.phase = combat.phase.transition(PhaseEvent::Begin)?;
        combat.attacker.roster = attackers;
        combat.defender.roster = defenders;
        combat.grid = Some(grid);
        combat.combatants = combatants;
        combat.held_on = None;
        combat.turn = 1;
        combat.current = SideKind::Attacker;
        combat.bump();
        for (urn, fighter) in &combat.combatants {
            w.set_combat_position(
                *urn,
                Some(CombatSlot {
                    combat: id,
                    pos: fighter.pos,
                }),
            )?;
        }
        for player in combat.players() {
            self.fighting.insert(player, id);
        }
        tracing::info!(
            combat = %id,
            units = combat.combatants.len(),
            "combat activated"
        );
        let first = combat.attacker.player;
        announce(w, combat, UpdateRecord::CombatActivated { combat: id, first });
        announce(
            w,
            combat,
            UpdateRecord::CombatTurn {
                combat: id,
                side: first,
                turn: 1,
            },
        );

        if combat.alive_on(SideKind::Defender).next().is_none() {
            // Undefended settlement or empty hazard: the attacker walks in.
            combat.winner = Some(SideKind::Attacker);
            combat.end = Some(EndReason::Eliminated);
            self.conclude(w, id)?;
        }
        Ok(())
    }

    /// The attacker calls the fight off, or the defender takes back its request.
    pub fn withdraw(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        if combat.phase.is_over() {
            return Err(ValidationError::CombatOver(id).into());
        }
        let side = combat
            .side_of(player)
            .ok_or(ValidationError::NotAParticipant)?;
        if !combat.phase.is_pending() {
            return Err(ValidationError::WrongPhase {
                phase: combat.phase,
                action: "withdraw",
            }
            .into());
        }
        match side {
            SideKind::Attacker => self.withdraw_now(w, id),
            SideKind::Defender => {
                if !combat.is_ready(player) {
                    return Err(ValidationError::NotTheAttacker.into());
                }
                let combat = self.get_mut(id)?;
                combat.ready.remove(&player);
                combat.held_on = None;
                if combat.phase == (CombatPhase::Requested { by: player }) {
                    combat.phase = combat.phase.transition(PhaseEvent::Unrequest)?;
                    let attacker = combat.attacker.player;
                    if combat.ready.contains(&attacker) {
                        combat.phase = combat
                            .phase
                            .transition(PhaseEvent::Request { by: attacker })?;
                    }
                }
                combat.bump();
                tracing::info!(combat = %id, ?player, "defender took back its request");
                Ok(())
            }
        }
    }

    fn withdraw_now(&mut self, w: &mut WorldWriter<'_>, id: CombatId) -> Result<(), CoreError> {
        let combat = self.get_mut(id)?;
        combat.phase = combat.phase.transition(PhaseEvent::Withdraw)?;
        combat.held_on = None;
        combat.bump();
        tracing::info!(combat = %id, "combat withdrawn");
        announce(w, combat, UpdateRecord::CombatWithdrawn { combat: id });
        Ok(())
    }

    pub fn move_unit(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
        unit: Urn,
        to: CombatPos,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let side = acting_side(combat, player, "move")?;
        let fighter = ready_fighter(combat, side, unit)?;
        let occupied = combat.combatants().any(|c| c.alive && c.pos == to);
        let cost = compute_combat_reachability(combat, unit)
            .filter(|grid| grid.classification(to) == Reachability::ReachableThisTurn)
            .and_then(|grid| grid.cost(to))
            .filter(|_| !occupied && to != fighter.pos)
            .ok_or(ValidationError::CombatMoveUnreachable)?;

        let combat = self.get_mut(id)?;
        let moves_left = match combat.combatants.get_mut(&unit) {
            Some(c) => {
                c.pos = to;
                c.moves_left = (c.moves_left - cost).max(0);
                c.moves_left
            }
            None => return Err(ValidationError::NotACombatant(unit).into()),
        };
        combat.bump();
        w.set_combat_position(unit, Some(CombatSlot { combat: id, pos: to }))?;
        announce(
            w,
            combat,
            UpdateRecord::CombatUnitMoved {
                combat: id,
                urn: unit,
                to,
                moves_left,
            },
        );
        Ok(())
    }

    pub fn attack(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
        attacker: Urn,
        target: Urn,
        resolver: &mut dyn DamageResolver,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let side = acting_side(combat, player, "attack")?;
        let striker = ready_fighter(combat, side, attacker)?.clone();
        let victim = combat
            .combatant(target)
            .filter(|c| c.alive && c.side != side && c.pos.distance(striker.pos) == 1)
            .ok_or(ValidationError::InvalidTarget(target))?
            .clone();

        let outcome = resolver.strike(&striker, &victim);
        let combat = self.get_mut(id)?;
        if let Some(c) = combat.combatants.get_mut(&target) {
            c.hit_points = (c.hit_points - outcome.damage).max(0);
            c.alive = c.hit_points > 0;
        }
        if let Some(c) = combat.combatants.get_mut(&attacker) {
            c.hit_points = (c.hit_points - outcome.retaliation).max(0);
            c.alive = c.hit_points > 0;
            c.acted = true;
            c.moves_left = 0;
        }
        combat.bump();
        tracing::debug!(
            combat = %id,
            %attacker,
            %target,
            damage = outcome.damage,
            retaliation = outcome.retaliation,
            "strike"
        );
        announce(
            w,
            combat,
            UpdateRecord::CombatStrike {
                combat: id,
                attacker,
                target,
                damage: outcome.damage,
                retaliation: outcome.retaliation,
            },
        );

        let winner = if combat.alive_on(side.other()).next().is_none() {
            Some(side)
        } else if combat.alive_on(side).next().is_none() {
            Some(side.other())
        } else {
            None
        };
        if let Some(winner) = winner {
            combat.winner = Some(winner);
            combat.end = Some(EndReason::Eliminated);
            self.conclude(w, id)?;
        }
        Ok(())
    }

    pub fn pass_unit(
        &mut self,
        id: CombatId,
        player: PlayerId,
        unit: Urn,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let side = acting_side(combat, player, "pass")?;
        let fighter = combat
            .combatant(unit)
            .filter(|c| c.side == side && c.alive)
            .ok_or(ValidationError::NotACombatant(unit))?;
        if fighter.acted {
            return Err(ValidationError::AlreadyActed(unit).into());
        }
        let combat = self.get_mut(id)?;
        if let Some(c) = combat.combatants.get_mut(&unit) {
            c.acted = true;
        }
        combat.bump();
        Ok(())
    }

    /// Hands the turn to the other side. Every unit must have acted or passed.
    pub fn end_turn(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let side = acting_side(combat, player, "end turn")?;
        let waiting = combat.alive_on(side).filter(|c| c.can_act()).count();
        if waiting > 0 {
            return Err(ValidationError::UnitsStillToAct(waiting).into());
        }
        self.advance_side(w, id)
    }

    /// Ends the current side's turn, passing anything that has not acted.
    fn finish_turn(&mut self, w: &mut WorldWriter<'_>, id: CombatId) -> Result<(), CoreError> {
        let combat = self.get_mut(id)?;
        let side = combat.current;
        for c in combat.combatants.values_mut().filter(|c| c.side == side) {
            c.acted = true;
        }
        self.advance_side(w, id)
    }

    fn advance_side(&mut self, w: &mut WorldWriter<'_>, id: CombatId) -> Result<(), CoreError> {
        let turn_limit = w.world().rules().combat.turn_limit;
        let combat = self.get_mut(id)?;
        let next = combat.current.other();
        if next == SideKind::Attacker {
            combat.turn += 1;
        }
        if combat.turn > turn_limit {
            tracing::info!(combat = %id, "turn limit reached; defender holds");
            combat.winner = Some(SideKind::Defender);
            combat.end = Some(EndReason::TurnLimit);
            return self.conclude(w, id);
        }
        combat.current = next;
        for c in combat.combatants.values_mut().filter(|c| c.side == next) {
            c.acted = false;
            c.moves_left = c.moves_per_turn;
        }
        combat.bump();
        let notice = UpdateRecord::CombatTurn {
            combat: id,
            side: combat.side(next).player,
            turn: combat.turn,
        };
        announce(w, combat, notice);
        Ok(())
    }

    pub fn set_auto_control(
        &mut self,
        id: CombatId,
        player: PlayerId,
        enabled: bool,
    ) -> Result<(), CoreError> {
        let combat = self.get_mut(id)?;
        if combat.phase.is_over() {
            return Err(ValidationError::CombatOver(id).into());
        }
        let side = combat
            .side_of(player)
            .ok_or(ValidationError::NotAParticipant)?;
        combat.side_mut(side).auto = enabled;
        combat.bump();
        tracing::debug!(combat = %id, ?player, enabled, "auto-control toggled");
        Ok(())
    }

    /// The attacker declines to press on. Survivors stay where they came from.
    pub fn retreat(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let side = acting_side(combat, player, "retreat")?;
        if side != SideKind::Attacker {
            return Err(ValidationError::NotTheAttacker.into());
        }
        let combat = self.get_mut(id)?;
        combat.winner = Some(SideKind::Defender);
        combat.end = Some(EndReason::Retreat);
        tracing::info!(combat = %id, ?player, "attacker retreats");
        self.conclude(w, id)
    }

    /// Orders planned by the auto-control policy against `revision`.
    ///
    /// Individual orders that no longer make sense are skipped; the side's
    /// turn ends afterwards regardless.
    pub fn apply_auto_orders(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
        revision: u64,
        orders: &[CombatOrder],
        resolver: &mut dyn DamageResolver,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        let side = acting_side(combat, player, "auto orders")?;
        if !combat.side(side).is_automatic() {
            return Err(ValidationError::NotAutoControlled.into());
        }
        if combat.revision != revision {
            return Err(CoordinationError::StaleDecision {
                planned: revision,
                current: combat.revision,
            }
            .into());
        }

        for order in orders {
            let result = match *order {
                CombatOrder::Move { unit, to } => self.move_unit(w, id, player, unit, to),
                CombatOrder::Attack { unit, target } => {
                    self.attack(w, id, player, unit, target, resolver)
                }
                CombatOrder::Pass { unit } => self.pass_unit(id, player, unit),
            };
            match result {
                Err(error) if error.is_consistency() => return Err(error),
                Err(error) => tracing::debug!(combat = %id, ?order, %error, "auto order skipped"),
                Ok(()) => {}
            }
            if self.get(id)?.phase != CombatPhase::Active {
                return Ok(());
            }
        }
        if self.get(id)?.current == side {
            self.finish_turn(w, id)?;
        }
        Ok(())
    }

    pub fn decide_capture(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        player: PlayerId,
        decision: CaptureDecision,
    ) -> Result<(), CoreError> {
        let combat = self.get(id)?;
        if combat.side_of(player).is_none() {
            return Err(ValidationError::NotAParticipant.into());
        }
        match combat.phase {
            CombatPhase::AwaitingDecision { decider } if decider == player => {}
            CombatPhase::AwaitingDecision { .. } => {
                return Err(ValidationError::NotTheAttacker.into())
            }
            _ => return Err(ValidationError::NoDecisionPending.into()),
        }
        tracing::info!(combat = %id, ?player, ?decision, "capture decided");
        self.finalize(w, id, Some(decision))
    }

    /// Leaves `Active`: frees both players, writes casualties back and either
    /// closes the combat or waits for the winner's capture decision.
    fn conclude(&mut self, w: &mut WorldWriter<'_>, id: CombatId) -> Result<(), CoreError> {
        let combat = self.get_mut(id)?;
        combat.phase = combat.phase.transition(PhaseEvent::Conclude)?;
        combat.bump();
        self.fighting.retain(|_, active| *active != id);

        let combat = self.get_mut(id)?;
        let mut summary = std::mem::take(&mut combat.summary);
        resolution::apply_casualties(w, combat, &mut summary);
        combat.summary = summary;
        tracing::info!(
            combat = %id,
            winner = ?combat.winner,
            end = ?combat.end,
            casualties = combat.summary.casualties.len(),
            "combat concluded"
        );

        let settlement = combat
            .settlement
            .filter(|urn| w.world().settlement(*urn).is_some());
        match (combat.winner, settlement) {
            (Some(SideKind::Attacker), Some(urn)) if !combat.attacker.ai => {
                let decider = combat.attacker.player;
                combat.phase = combat
                    .phase
                    .transition(PhaseEvent::AwaitDecision { decider })?;
                w.notify(
                    decider,
                    UpdateRecord::CombatDecisionRequired {
                        combat: id,
                        settlement: urn,
                    },
                );
            }
            (Some(SideKind::Attacker), Some(_)) => {
                self.finalize(w, id, Some(CaptureDecision::Capture))?;
            }
            _ => self.finalize(w, id, None)?,
        }

        self.release_held(w);
        Ok(())
    }

    fn finalize(
        &mut self,
        w: &mut WorldWriter<'_>,
        id: CombatId,
        decision: Option<CaptureDecision>,
    ) -> Result<(), CoreError> {
        let combat = self.get_mut(id)?;
        combat.phase = combat.phase.transition(PhaseEvent::Close)?;
        combat.bump();
        let mut summary = std::mem::take(&mut combat.summary);
        resolution::close(w, combat, decision, &mut summary);
        combat.summary = summary.clone();
        tracing::info!(combat = %id, winner = ?summary.winner, "combat closed");
        announce(w, combat, UpdateRecord::CombatClosed { combat: id, summary });
        Ok(())
    }

    /// Retries every held combat; called whenever someone stops fighting.
    fn release_held(&mut self, w: &mut WorldWriter<'_>) {
        let held: Vec<CombatId> = self
            .combats
            .values()
            .filter(|c| c.phase.is_pending() && c.held_on.is_some())
            .map(|c| c.id)
            .collect();
        for id in held {
            match self.try_activate(w, id) {
                Ok(true) => tracing::info!(combat = %id, "held combat promoted"),
                Ok(false) => {}
                Err(error) => tracing::error!(combat = %id, %error, "promoting held combat failed"),
            }
        }
    }

    /// Withdraws scheduled combats whose attacker or defender is no longer there.
    pub fn prune_orphaned(&mut self, w: &mut WorldWriter<'_>) -> Vec<CombatId> {
        let world = w.world();
        let orphaned: Vec<CombatId> = self
            .combats
            .values()
            .filter(|c| c.phase.is_pending())
            .filter(|c| {
                attacker_roster(world, c).is_empty()
                    || !world.is_hostile_to(c.attacker.player, c.at)
            })
            .map(|c| c.id)
            .collect();
        for id in &orphaned {
            if let Err(error) = self.withdraw_now(w, *id) {
                tracing::error!(combat = %id, %error, "withdrawing orphaned combat failed");
            }
        }
        orphaned
    }

    /// One job per active combat whose current side plays automatically.
    pub fn pending_auto_turns(&self) -> Vec<AutoTurnJob> {
        self.combats
            .values()
            .filter(|c| c.phase == CombatPhase::Active)
            .filter(|c| c.side(c.current).is_automatic())
            .map(|c| AutoTurnJob {
                combat: c.id,
                player: c.side(c.current).player,
                side: c.current,
                revision: c.revision,
                snapshot: c.clone(),
            })
            .collect()
    }

    /// Enrollment checks: one active combat per player, and every combat
    /// position matches a live combatant of an active combat.
    pub fn check_invariants(&self, world: &World) -> Result<(), ConsistencyError> {
        let mut seats: BTreeMap<PlayerId, CombatId> = BTreeMap::new();
        for combat in self.combats.values() {
            let active = combat.phase == CombatPhase::Active;
            for player in combat.players() {
                if active && seats.insert(player, combat.id).is_some() {
                    return Err(ConsistencyError::CombatEnrollment {
                        urn: Urn(0),
                        combat: Some(combat.id),
                    });
                }
            }
            if !active {
                continue;
            }
            for fighter in combat.combatants().filter(|c| c.alive) {
                let slot = world.unit(fighter.urn).and_then(|u| u.combat);
                if slot.map(|s| (s.combat, s.pos)) != Some((combat.id, fighter.pos)) {
                    return Err(ConsistencyError::CombatEnrollment {
                        urn: fighter.urn,
                        combat: Some(combat.id),
                    });
                }
            }
        }
        if seats != self.fighting {
            return Err(ConsistencyError::CombatEnrollment {
                urn: Urn(0),
                combat: None,
            });
        }
        for (urn, unit) in world.units() {
            let Some(slot) = unit.combat else {
                continue;
            };
            let enrolled = self
                .combats
                .get(&slot.combat)
                .filter(|c| c.phase == CombatPhase::Active)
                .and_then(|c| c.combatant(urn))
                .is_some();
            if !enrolled {
                return Err(ConsistencyError::CombatEnrollment {
                    urn,
                    combat: Some(slot.combat),
                });
            }
        }
        Ok(())
    }
}

fn announce(w: &mut WorldWriter<'_>, combat: &Combat, record: UpdateRecord) {
    for player in combat.players() {
        w.notify(player, record.clone());
    }
}

/// Which side `player` plays, provided the combat is active and it is their turn.
fn acting_side(
    combat: &Combat,
    player: PlayerId,
    action: &'static str,
) -> Result<SideKind, ValidationError> {
    if combat.phase.is_over() {
        return Err(ValidationError::CombatOver(combat.id));
    }
    let side = combat
        .side_of(player)
        .ok_or(ValidationError::NotAParticipant)?;
    if combat.phase != CombatPhase::Active {
        return Err(ValidationError::WrongPhase {
            phase: combat.phase,
            action,
        });
    }
    if combat.current != side {
        return Err(ValidationError::NotYourTurn);
    }
    Ok(side)
}

fn ready_fighter(combat: &Combat, side: SideKind, urn: Urn) -> Result<&Combatant, ValidationError> {
    let fighter = combat
        .combatant(urn)
        .filter(|c| c.side == side && c.alive)
        .ok_or(ValidationError::NotACombatant(urn))?;
    if !fighter.can_act() {
        return Err(ValidationError::AlreadyActed(urn));
    }
    Ok(fighter)
}

/// Committed attackers still standing on the origin cell and not fighting elsewhere.
fn attacker_roster(world: &World, combat: &Combat) -> Vec<Urn> {
    combat
        .attacker
        .roster
        .iter()
        .copied()
        .filter(|urn| {
            world.unit(*urn).is_some_and(|u| {
                u.is_on_map()
                    && u.owner == combat.attacker.player
                    && u.location == combat.from
                    && u.combat.is_none()
            })
        })
        .collect()
}

fn defender_roster(world: &World, defender: PlayerId, at: Coordinate) -> Vec<Urn> {
    world
        .units_at(at)
        .into_iter()
        .filter(|(_, u)| u.owner == defender && u.combat.is_none())
        .map(|(urn, _)| urn)
        .collect()
}
