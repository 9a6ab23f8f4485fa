//! The authoritative World Model.
//!
//! [`World`] is read freely; it is mutated only through [`WorldWriter`], whose
//! named mutators publish a [`Change`] to the replication engine before they
//! return. Nothing else in the crate holds `&mut World` while players exist.

use std::collections::BTreeMap;

use overland_protocol::{
    CellRecord, Coordinate, EffectId, EffectKind, EffectRecord, EffectTarget, HazardKind,
    PlayerId, PlayerPublic, RemovalReason, SettlementRecord, TerrainKind, UnitRecord, UnitStatus,
    UpdateRecord, Urn,
};

use crate::entities::{UrnAllocator, UrnTable};
use crate::error::{ConsistencyError, CoreError, ValidationError};
use crate::map::{Hazard, MapShape, OverlandMap};
use crate::replication::ReplicationEngine;
use crate::rules::Rules;
use crate::settlement::{Building, Settlement};
use crate::unit::{CombatSlot, Unit};

#[derive(Clone, Debug)]
pub struct Effect {
    pub caster: PlayerId,
    pub kind: EffectKind,
    pub target: EffectTarget,
    pub anchor: Coordinate,
    pub upkeep: i32,
}

impl Effect {
    pub fn record(&self, id: EffectId) -> EffectRecord {
        EffectRecord {
            id,
            caster: self.caster,
            kind: self.kind.clone(),
            target: self.target,
            anchor: self.anchor,
            upkeep: self.upkeep,
        }
    }

    pub fn grants_vision(&self) -> bool {
        matches!(self.kind, EffectKind::TrueSight { .. })
    }
}

#[derive(Clone, Debug)]
pub struct PlayerSetup {
    pub name: String,
    pub is_ai: bool,
    pub gold: i32,
}

impl PlayerSetup {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: false,
            gold: 0,
        }
    }

    pub fn ai(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: true,
            gold: 0,
        }
    }

    pub fn with_gold(mut self, gold: i32) -> Self {
        self.gold = gold;
        self
    }
}

/// A mutation as seen by the replication engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    UnitCreated { urn: Urn },
    UnitMoved { urn: Urn, from: Coordinate, to: Coordinate },
    UnitUpdated { urn: Urn, vision: bool },
    UnitRemoved { urn: Urn, at: Coordinate, reason: RemovalReason },
    SettlementUpdated { urn: Urn },
    SettlementRemoved { urn: Urn, at: Coordinate },
    CellUpdated { coord: Coordinate },
    EffectAdded { id: EffectId, vision: bool },
    EffectRemoved { id: EffectId, at: Coordinate, vision: bool },
    PlayerUpdated { player: PlayerId },
    TurnStarted { turn: u32 },
}

impl Change {
    /// Whether the change can alter any player's visible cells.
    pub fn touches_vision(&self) -> bool {
        match self {
            Change::UnitCreated { .. }
            | Change::UnitMoved { .. }
            | Change::UnitRemoved { .. }
            | Change::SettlementUpdated { .. }
            | Change::SettlementRemoved { .. } => true,
            Change::UnitUpdated { vision, .. }
            | Change::EffectAdded { vision, .. }
            | Change::EffectRemoved { vision, .. } => *vision,
            Change::CellUpdated { .. }
            | Change::PlayerUpdated { .. }
            | Change::TurnStarted { .. } => false,
        }
    }
}

/// The full replicated shape of one cell. Memory of a visible cell must equal this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellView {
    pub cell: CellRecord,
    pub units: Vec<UnitRecord>,
    pub settlement: Option<SettlementRecord>,
    pub effects: Vec<EffectRecord>,
}

#[derive(Clone, Debug)]
pub struct World {
    rules: Rules,
    map: OverlandMap,
    units: UrnTable<Unit>,
    settlements: UrnTable<Settlement>,
    effects: BTreeMap<EffectId, Effect>,
    players: Vec<PlayerPublic>,
    urns: UrnAllocator,
    next_effect: u32,
    turn: u32,
}

impl World {
    pub fn new(rules: Rules, map: OverlandMap, players: Vec<PlayerSetup>) -> Self {
        let players = players
            .into_iter()
            .enumerate()
            .map(|(i, setup)| PlayerPublic {
                id: PlayerId(i as u8),
                name: setup.name,
                is_ai: setup.is_ai,
                fame: 0,
                gold: setup.gold,
                alive: true,
            })
            .collect();
        Self {
            rules,
            map,
            units: UrnTable::default(),
            settlements: UrnTable::default(),
            effects: BTreeMap::new(),
            players,
            urns: UrnAllocator::default(),
            next_effect: 0,
            turn: 1,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn map(&self) -> &OverlandMap {
        &self.map
    }

    pub fn shape(&self) -> MapShape {
        self.map.shape()
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn unit(&self, urn: Urn) -> Option<&Unit> {
        self.units.get(urn)
    }

    pub fn units(&self) -> impl Iterator<Item = (Urn, &Unit)> {
        self.units.iter()
    }

    /// Units standing on the map at `coord`, in URN order.
    pub fn units_at(&self, coord: Coordinate) -> Vec<(Urn, &Unit)> {
        self.units
            .iter()
            .filter(|(_, u)| u.is_on_map() && u.location == coord)
            .collect()
    }

    pub fn settlement(&self, urn: Urn) -> Option<&Settlement> {
        self.settlements.get(urn)
    }

    pub fn settlements(&self) -> impl Iterator<Item = (Urn, &Settlement)> {
        self.settlements.iter()
    }

    pub fn settlement_at(&self, coord: Coordinate) -> Option<(Urn, &Settlement)> {
        let urn = self.map.get(coord)?.settlement?;
        self.settlements.get(urn).map(|s| (urn, s))
    }

    pub fn hazard_at(&self, coord: Coordinate) -> Option<&Hazard> {
        self.map.get(coord)?.hazard.as_ref()
    }

    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.effects.get(&id)
    }

    pub fn effects(&self) -> impl Iterator<Item = (EffectId, &Effect)> {
        self.effects.iter().map(|(id, e)| (*id, e))
    }

    pub fn effects_at(&self, coord: Coordinate) -> Vec<(EffectId, &Effect)> {
        self.effects
            .iter()
            .filter(|(_, e)| e.anchor == coord)
            .map(|(id, e)| (*id, e))
            .collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerPublic> {
        self.players.get(id.index())
    }

    pub fn players(&self) -> &[PlayerPublic] {
        &self.players
    }

    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().map(|p| p.id)
    }

    /// Neutral guardians count as AI.
    pub fn is_ai(&self, id: PlayerId) -> bool {
        id.is_neutral() || self.player(id).is_some_and(|p| p.is_ai)
    }

    pub fn is_tombstoned(&self, urn: Urn) -> bool {
        self.units.is_tombstoned(urn) || self.settlements.is_tombstoned(urn)
    }

    /// URN resolves to a live unit or settlement, or to a tombstone.
    pub fn urn_accounted_for(&self, urn: Urn) -> bool {
        self.units.contains(urn) || self.settlements.contains(urn) || self.is_tombstoned(urn)
    }

    /// Something at `coord` would fight a stack owned by `viewer`.
    pub fn is_hostile_to(&self, viewer: PlayerId, coord: Coordinate) -> bool {
        if self.units_at(coord).iter().any(|(_, u)| u.owner != viewer) {
            return true;
        }
        if self.settlement_at(coord).is_some_and(|(_, s)| s.owner != viewer) {
            return true;
        }
        self.hazard_at(coord).is_some()
    }

    pub fn cell_view(&self, coord: Coordinate) -> Option<CellView> {
        let cell = self.map.record(coord)?;
        let coord = cell.coord;
        Some(CellView {
            units: self
                .units_at(coord)
                .into_iter()
                .map(|(urn, u)| u.record(urn))
                .collect(),
            settlement: self.settlement_at(coord).map(|(urn, s)| s.record(urn)),
            effects: self
                .effects_at(coord)
                .into_iter()
                .map(|(id, e)| e.record(id))
                .collect(),
            cell,
        })
    }

    /// World-local referential checks. Combat and memory checks live with their owners.
    pub fn check_invariants(&self) -> Result<(), ConsistencyError> {
        for (coord, cell) in self.map.cells() {
            if let Some(urn) = cell.settlement {
                match self.settlements.get(urn) {
                    Some(s) if s.location == coord => {}
                    _ => return Err(ConsistencyError::DanglingUrn(urn)),
                }
            }
            if let Some(hazard) = &cell.hazard {
                for urn in hazard.guardians.iter().chain(&hazard.captives) {
                    if !self.urn_accounted_for(*urn) {
                        return Err(ConsistencyError::DanglingUrn(*urn));
                    }
                }
            }
        }
        for (_, effect) in self.effects() {
            let target = match effect.target {
                EffectTarget::Unit { urn } | EffectTarget::Settlement { urn } => Some(urn),
                EffectTarget::None => None,
            };
            if let Some(urn) = target.filter(|urn| !self.urn_accounted_for(*urn)) {
                return Err(ConsistencyError::DanglingUrn(urn));
            }
        }
        Ok(())
    }

    pub fn writer<'a>(&'a mut self, replication: &'a mut ReplicationEngine) -> WorldWriter<'a> {
        WorldWriter {
            world: self,
            replication,
        }
    }

    fn unit_mut(&mut self, urn: Urn) -> Result<&mut Unit, ValidationError> {
        self.units.get_mut(urn).ok_or(ValidationError::UnknownUnit(urn))
    }

    fn settlement_mut(&mut self, urn: Urn) -> Result<&mut Settlement, ValidationError> {
        self.settlements
            .get_mut(urn)
            .ok_or(ValidationError::UnknownSettlement(urn))
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerPublic> {
        self.players.get_mut(id.index())
    }

    fn normalize(&self, coord: Coordinate) -> Result<Coordinate, ValidationError> {
        self.shape()
            .normalize(coord)
            .ok_or(ValidationError::OffMap(coord))
    }
}

/// The only way to mutate a [`World`]. Every mutator publishes before returning.
pub struct WorldWriter<'a> {
    world: &'a mut World,
    replication: &'a mut ReplicationEngine,
}

impl WorldWriter<'_> {
    pub fn world(&self) -> &World {
        self.world
    }

    fn publish(&mut self, change: Change) {
        self.replication.publish(self.world, &change);
    }

    /// Queues a notice carrying no world state for one player.
    pub fn notify(&mut self, player: PlayerId, record: UpdateRecord) {
        self.replication.notify(player, record);
    }

    pub fn spawn_unit(
        &mut self,
        owner: PlayerId,
        kind: &str,
        at: Coordinate,
    ) -> Result<Urn, CoreError> {
        let urn = self.insert_unit(owner, kind, at, UnitStatus::Alive)?;
        self.publish(Change::UnitCreated { urn });
        Ok(urn)
    }

    /// Creates a unit that exists but is not yet on the map (reinforcements, captives).
    pub fn spawn_generated_unit(
        &mut self,
        owner: PlayerId,
        kind: &str,
        at: Coordinate,
    ) -> Result<Urn, CoreError> {
        let urn = self.insert_unit(owner, kind, at, UnitStatus::Generated)?;
        self.publish(Change::UnitCreated { urn });
        Ok(urn)
    }

    fn insert_unit(
        &mut self,
        owner: PlayerId,
        kind: &str,
        at: Coordinate,
        status: UnitStatus,
    ) -> Result<Urn, CoreError> {
        let at = self.world.normalize(at)?;
        let utype = self
            .world
            .rules
            .unit_type(kind)
            .ok_or_else(|| ValidationError::UnknownUnitType(kind.to_string()))?;
        let mut unit = Unit::from_type(utype, owner, at);
        unit.status = status;
        let urn = self.world.urns.allocate();
        self.world.units.insert(urn, unit);
        Ok(urn)
    }

    pub fn place_generated_unit(&mut self, urn: Urn, at: Coordinate) -> Result<(), CoreError> {
        let at = self.world.normalize(at)?;
        let unit = self.world.unit_mut(urn)?;
        if unit.status != UnitStatus::Generated {
            return Err(ValidationError::UnitNotAlive(urn).into());
        }
        unit.status = UnitStatus::Alive;
        unit.location = at;
        self.publish(Change::UnitCreated { urn });
        Ok(())
    }

    /// Moves one unit a single step, spending `cost` from its budget.
    pub fn move_unit(&mut self, urn: Urn, to: Coordinate, cost: i32) -> Result<(), CoreError> {
        let to = self.world.normalize(to)?;
        let unit = self.world.unit_mut(urn)?;
        if !unit.is_on_map() {
            return Err(ValidationError::UnitNotAlive(urn).into());
        }
        let from = unit.location;
        unit.location = to;
        unit.moves_left = (unit.moves_left - cost).max(0);
        self.publish(Change::UnitMoved { urn, from, to });
        Ok(())
    }

    pub fn set_unit_moves(&mut self, urn: Urn, moves_left: i32) -> Result<(), CoreError> {
        let unit = self.world.unit_mut(urn)?;
        unit.moves_left = moves_left.clamp(0, unit.moves_per_turn);
        self.publish(Change::UnitUpdated { urn, vision: false });
        Ok(())
    }

    /// Lowers hit points, never below zero. Removal of the fallen is [`Self::kill_unit`]'s job.
    pub fn damage_unit(&mut self, urn: Urn, amount: i32) -> Result<(), CoreError> {
        let unit = self.world.unit_mut(urn)?;
        unit.hit_points = (unit.hit_points - amount.max(0)).max(0);
        self.publish(Change::UnitUpdated { urn, vision: false });
        Ok(())
    }

    pub fn kill_unit(&mut self, urn: Urn) -> Result<(), CoreError> {
        self.remove_unit(urn, RemovalReason::Died)
    }

    pub fn dismiss_unit(&mut self, urn: Urn) -> Result<(), CoreError> {
        self.remove_unit(urn, RemovalReason::Dismissed)
    }

    fn remove_unit(&mut self, urn: Urn, reason: RemovalReason) -> Result<(), CoreError> {
        let mut unit = self
            .world
            .units
            .remove(urn)
            .ok_or(ValidationError::UnknownUnit(urn))?;
        if reason == RemovalReason::Died {
            unit.status = UnitStatus::Dead;
        }
        tracing::debug!(%urn, kind = %unit.kind, ?reason, "unit removed");
        self.publish(Change::UnitRemoved {
            urn,
            at: unit.location,
            reason,
        });
        Ok(())
    }

    pub fn set_combat_position(
        &mut self,
        urn: Urn,
        slot: Option<CombatSlot>,
    ) -> Result<(), CoreError> {
        let unit = self.world.unit_mut(urn)?;
        unit.combat = slot;
        self.publish(Change::UnitUpdated { urn, vision: false });
        Ok(())
    }

    pub fn change_unit_owner(&mut self, urn: Urn, owner: PlayerId) -> Result<(), CoreError> {
        let unit = self.world.unit_mut(urn)?;
        unit.owner = owner;
        self.publish(Change::UnitUpdated { urn, vision: true });
        Ok(())
    }

    pub fn found_settlement(
        &mut self,
        owner: PlayerId,
        name: &str,
        at: Coordinate,
    ) -> Result<Urn, CoreError> {
        let at = self.world.normalize(at)?;
        let urn = self.world.urns.allocate();
        let Some(cell) = self.world.map.get_mut(at) else {
            return Err(ValidationError::OffMap(at).into());
        };
        cell.settlement = Some(urn);
        self.world
            .settlements
            .insert(urn, Settlement::new(name, owner, at));
        self.publish(Change::SettlementUpdated { urn });
        self.publish(Change::CellUpdated { coord: at });
        Ok(urn)
    }

    pub fn set_settlement_owner(&mut self, urn: Urn, owner: PlayerId) -> Result<(), CoreError> {
        self.world.settlement_mut(urn)?.owner = owner;
        self.publish(Change::SettlementUpdated { urn });
        Ok(())
    }

    pub fn raze_settlement(&mut self, urn: Urn) -> Result<(), CoreError> {
        let settlement = self
            .world
            .settlements
            .remove(urn)
            .ok_or(ValidationError::UnknownSettlement(urn))?;
        let at = settlement.location;
        if let Some(cell) = self.world.map.get_mut(at) {
            cell.settlement = None;
        }
        tracing::info!(%urn, name = %settlement.name, "settlement razed");
        self.publish(Change::SettlementRemoved { urn, at });
        self.publish(Change::CellUpdated { coord: at });
        Ok(())
    }

    /// Starts work on a building; it completes during turn processing.
    pub fn queue_building(&mut self, urn: Urn, kind: &str) -> Result<(), CoreError> {
        let turns = self
            .world
            .rules
            .building_type(kind)
            .map(|b| b.turns.max(1))
            .ok_or_else(|| ValidationError::UnknownBuilding(kind.to_string()))?;
        self.world.settlement_mut(urn)?.buildings.push(Building {
            kind: kind.to_string(),
            turns_left: turns,
        });
        self.publish(Change::SettlementUpdated { urn });
        Ok(())
    }

    /// One turn of work on every unfinished building. Returns the kinds that completed.
    pub fn advance_construction(&mut self, urn: Urn) -> Result<Vec<String>, CoreError> {
        let settlement = self.world.settlement_mut(urn)?;
        let mut completed = Vec::new();
        for building in settlement.buildings.iter_mut().filter(|b| !b.is_complete()) {
            building.turns_left -= 1;
            if building.is_complete() {
                completed.push(building.kind.clone());
            }
        }
        self.publish(Change::SettlementUpdated { urn });
        Ok(completed)
    }

    pub fn complete_building(&mut self, urn: Urn, kind: &str) -> Result<(), CoreError> {
        let settlement = self.world.settlement_mut(urn)?;
        match settlement.buildings.iter_mut().find(|b| b.kind == kind) {
            Some(building) => building.turns_left = 0,
            None => settlement.buildings.push(Building {
                kind: kind.to_string(),
                turns_left: 0,
            }),
        }
        self.publish(Change::SettlementUpdated { urn });
        Ok(())
    }

    /// Removes a completed building and credits its value to the owner's treasury.
    pub fn sell_building(&mut self, urn: Urn, kind: &str) -> Result<i32, CoreError> {
        let value = self
            .world
            .rules
            .building_type(kind)
            .map(|b| b.sell_value)
            .unwrap_or(0);
        let settlement = self.world.settlement_mut(urn)?;
        let index = settlement
            .buildings
            .iter()
            .position(|b| b.kind == kind && b.is_complete())
            .ok_or_else(|| ValidationError::UnknownBuilding(kind.to_string()))?;
        settlement.buildings.remove(index);
        let owner = settlement.owner;
        self.publish(Change::SettlementUpdated { urn });
        self.adjust_gold(owner, value);
        Ok(value)
    }

    pub fn adjust_settlement_gold(&mut self, urn: Urn, delta: i32) -> Result<i32, CoreError> {
        let settlement = self.world.settlement_mut(urn)?;
        settlement.gold = (settlement.gold + delta).max(0);
        let gold = settlement.gold;
        self.publish(Change::SettlementUpdated { urn });
        Ok(gold)
    }

    pub fn add_effect(
        &mut self,
        caster: PlayerId,
        kind: EffectKind,
        target: EffectTarget,
        anchor: Coordinate,
        upkeep: i32,
    ) -> Result<EffectId, CoreError> {
        let anchor = self.world.normalize(anchor)?;
        self.world.next_effect += 1;
        let id = EffectId(self.world.next_effect);
        let effect = Effect {
            caster,
            kind,
            target,
            anchor,
            upkeep,
        };
        let vision = effect.grants_vision();
        self.world.effects.insert(id, effect);
        if let Some(cell) = self.world.map.get_mut(anchor) {
            cell.effects.push(id);
        }
        self.publish(Change::EffectAdded { id, vision });
        Ok(id)
    }

    pub fn remove_effect(&mut self, id: EffectId) -> Result<(), CoreError> {
        let Some(effect) = self.world.effects.remove(&id) else {
            return Ok(());
        };
        let at = effect.anchor;
        if let Some(cell) = self.world.map.get_mut(at) {
            cell.effects.retain(|e| *e != id);
        }
        self.publish(Change::EffectRemoved {
            id,
            at,
            vision: effect.grants_vision(),
        });
        Ok(())
    }

    /// Places a guarded site: neutral guardians on the cell and generated captives held there.
    pub fn create_hazard(
        &mut self,
        at: Coordinate,
        kind: HazardKind,
        guardians: &[&str],
        captives: &[&str],
    ) -> Result<(), CoreError> {
        let at = self.world.normalize(at)?;
        let mut hazard = Hazard {
            kind,
            guardians: Vec::new(),
            captives: Vec::new(),
        };
        for guardian in guardians {
            hazard
                .guardians
                .push(self.spawn_unit(PlayerId::NEUTRAL, guardian, at)?);
        }
        for captive in captives {
            hazard
                .captives
                .push(self.spawn_generated_unit(PlayerId::NEUTRAL, captive, at)?);
        }
        if let Some(cell) = self.world.map.get_mut(at) {
            cell.hazard = Some(hazard);
        }
        self.publish(Change::CellUpdated { coord: at });
        Ok(())
    }

    pub fn clear_hazard(&mut self, at: Coordinate) -> Option<Hazard> {
        let hazard = self.world.map.get_mut(at)?.hazard.take()?;
        self.publish(Change::CellUpdated { coord: at });
        Some(hazard)
    }

    pub fn adjust_fame(&mut self, player: PlayerId, delta: i32) {
        if let Some(p) = self.world.player_mut(player) {
            p.fame += delta;
            self.publish(Change::PlayerUpdated { player });
        }
    }

    pub fn adjust_gold(&mut self, player: PlayerId, delta: i32) {
        if let Some(p) = self.world.player_mut(player) {
            p.gold += delta;
            self.publish(Change::PlayerUpdated { player });
        }
    }

    /// Restores every unit's movement to its per-turn maximum.
    pub fn reset_turn_budgets(&mut self) {
        let stale: Vec<Urn> = self
            .world
            .units
            .iter()
            .filter(|(_, u)| u.moves_left != u.moves_per_turn)
            .map(|(urn, _)| urn)
            .collect();
        for urn in stale {
            if let Some(unit) = self.world.units.get_mut(urn) {
                unit.moves_left = unit.moves_per_turn;
            }
            self.publish(Change::UnitUpdated { urn, vision: false });
        }
    }

    pub fn advance_turn(&mut self) -> u32 {
        self.world.turn += 1;
        let turn = self.world.turn;
        self.publish(Change::TurnStarted { turn });
        turn
    }

    // Map authoring helpers for scenario setup; these publish like any other mutation.

    pub fn set_terrain(&mut self, at: Coordinate, terrain: TerrainKind) {
        self.world.map.set_terrain(at, terrain);
        self.publish(Change::CellUpdated { coord: at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{load_rules, RulesSource};

    fn world() -> (World, ReplicationEngine) {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = OverlandMap::new(MapShape::new(8, 8, 1, false), TerrainKind::Grassland);
        let world = World::new(
            rules,
            map,
            vec![PlayerSetup::human("A"), PlayerSetup::human("B")],
        );
        let replication = ReplicationEngine::new(&world);
        (world, replication)
    }

    #[test]
    fn killed_units_are_tombstoned_and_urns_stay_unique() {
        let (mut world, mut repl) = world();
        let mut w = world.writer(&mut repl);
        let a = w
            .spawn_unit(PlayerId(0), "spearmen", Coordinate::new(1, 1, 0))
            .expect("spawn");
        w.kill_unit(a).expect("kill");
        let b = w
            .spawn_unit(PlayerId(0), "spearmen", Coordinate::new(1, 1, 0))
            .expect("spawn");
        assert!(b > a);
        assert!(world.is_tombstoned(a));
        assert!(world.unit(a).is_none());
        assert_eq!(world.units_at(Coordinate::new(1, 1, 0)).len(), 1);
    }

    #[test]
    fn razing_clears_the_cell_pointer() {
        let (mut world, mut repl) = world();
        let at = Coordinate::new(3, 3, 0);
        let mut w = world.writer(&mut repl);
        let town = w.found_settlement(PlayerId(1), "Keep", at).expect("found");
        assert!(world.settlement_at(at).is_some());
        world.writer(&mut repl).raze_settlement(town).expect("raze");
        assert!(world.settlement_at(at).is_none());
        assert!(world.check_invariants().is_ok());
    }

    #[test]
    fn selling_requires_a_completed_building() {
        let (mut world, mut repl) = world();
        let at = Coordinate::new(3, 3, 0);
        let mut w = world.writer(&mut repl);
        let town = w.found_settlement(PlayerId(0), "Keep", at).expect("found");
        w.queue_building(town, "smithy").expect("queue");
        let err = w.sell_building(town, "smithy").expect_err("incomplete");
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::UnknownBuilding(_))
        ));
        w.complete_building(town, "smithy").expect("complete");
        let value = w.sell_building(town, "smithy").expect("sell");
        assert_eq!(value, 20);
        assert_eq!(world.player(PlayerId(0)).map(|p| p.gold), Some(20));
    }
}
