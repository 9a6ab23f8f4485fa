use std::collections::BTreeMap;

use overland_protocol::{
    CellRecord, Coordinate, EffectId, EffectRecord, PlayerId, PlayerPublic, SettlementRecord,
    UnitRecord, UpdateRecord, Urn,
};

use crate::map::MapShape;
use crate::world::CellView;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RememberedCell {
    pub record: CellRecord,
    pub last_seen_turn: u32,
    pub visible: bool,
}

/// One player's possibly stale replica of the world.
///
/// Populated only by applying [`UpdateRecord`]s, which is exactly what a
/// client does with the records it receives.
#[derive(Clone, Debug)]
pub struct PlayerMemory {
    player: PlayerId,
    shape: MapShape,
    turn: u32,
    cells: BTreeMap<Coordinate, RememberedCell>,
    units: BTreeMap<Urn, UnitRecord>,
    settlements: BTreeMap<Urn, SettlementRecord>,
    effects: BTreeMap<EffectId, EffectRecord>,
    players: BTreeMap<PlayerId, PlayerPublic>,
}

impl PlayerMemory {
    pub fn new(player: PlayerId, shape: MapShape) -> Self {
        Self {
            player,
            shape,
            turn: 0,
            cells: BTreeMap::new(),
            units: BTreeMap::new(),
            settlements: BTreeMap::new(),
            effects: BTreeMap::new(),
            players: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> PlayerId {
        self.player
    }

    pub fn shape(&self) -> MapShape {
        self.shape
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn apply(&mut self, record: &UpdateRecord) {
        match record {
            UpdateRecord::TurnStarted { turn } => self.turn = *turn,
            UpdateRecord::CellRevealed { cell, turn } => {
                self.cells.insert(
                    cell.coord,
                    RememberedCell {
                        record: cell.clone(),
                        last_seen_turn: *turn,
                        visible: true,
                    },
                );
            }
            UpdateRecord::CellPatched { cell } => {
                let turn = self.turn;
                self.cells
                    .entry(cell.coord)
                    .and_modify(|c| c.record = cell.clone())
                    .or_insert_with(|| RememberedCell {
                        record: cell.clone(),
                        last_seen_turn: turn,
                        visible: true,
                    });
            }
            UpdateRecord::CellHidden { coord } => {
                if let Some(cell) = self.cells.get_mut(coord) {
                    cell.visible = false;
                }
            }
            UpdateRecord::UnitUpserted { unit } => {
                self.units.insert(unit.urn, unit.clone());
            }
            UpdateRecord::UnitMoved {
                urn, to, moves_left, ..
            } => {
                if let Some(unit) = self.units.get_mut(urn) {
                    unit.location = *to;
                    unit.moves_left = *moves_left;
                }
            }
            UpdateRecord::UnitPatched {
                urn,
                hit_points,
                moves_left,
                status,
                combat,
            } => {
                if let Some(unit) = self.units.get_mut(urn) {
                    unit.hit_points = *hit_points;
                    unit.moves_left = *moves_left;
                    unit.status = *status;
                    unit.combat = *combat;
                }
            }
            UpdateRecord::UnitLeftView { urn, .. } | UpdateRecord::UnitRemoved { urn, .. } => {
                self.units.remove(urn);
            }
            UpdateRecord::SettlementUpserted { settlement }
            | UpdateRecord::SettlementPatched { settlement } => {
                self.settlements.insert(settlement.urn, settlement.clone());
            }
            UpdateRecord::SettlementOwnerChanged { urn, owner } => {
                if let Some(settlement) = self.settlements.get_mut(urn) {
                    settlement.owner = *owner;
                }
            }
            UpdateRecord::SettlementRemoved { urn, .. } => {
                self.settlements.remove(urn);
            }
            UpdateRecord::EffectAdded { effect } => {
                self.effects.insert(effect.id, effect.clone());
            }
            UpdateRecord::EffectRemoved { id, .. } => {
                self.effects.remove(id);
            }
            UpdateRecord::PlayerUpdated { player } => {
                self.players.insert(player.id, player.clone());
            }
            // Combat notices carry no world state.
            _ => {}
        }
    }

    pub fn cell(&self, coord: Coordinate) -> Option<&RememberedCell> {
        self.cells.get(&coord)
    }

    pub fn cells(&self) -> impl Iterator<Item = &RememberedCell> {
        self.cells.values()
    }

    pub fn unit(&self, urn: Urn) -> Option<&UnitRecord> {
        self.units.get(&urn)
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    pub fn units_at(&self, coord: Coordinate) -> Vec<&UnitRecord> {
        self.units.values().filter(|u| u.location == coord).collect()
    }

    pub fn settlement(&self, urn: Urn) -> Option<&SettlementRecord> {
        self.settlements.get(&urn)
    }

    pub fn settlement_at(&self, coord: Coordinate) -> Option<&SettlementRecord> {
        self.settlements.values().find(|s| s.location == coord)
    }

    pub fn effect(&self, id: EffectId) -> Option<&EffectRecord> {
        self.effects.get(&id)
    }

    pub fn effects_at(&self, coord: Coordinate) -> Vec<&EffectRecord> {
        self.effects.values().filter(|e| e.anchor == coord).collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerPublic> {
        self.players.get(&id)
    }

    /// The remembered counterpart of [`crate::World::cell_view`].
    pub fn view(&self, coord: Coordinate) -> Option<CellView> {
        let cell = self.cells.get(&coord)?;
        Some(CellView {
            cell: cell.record.clone(),
            units: self.units_at(coord).into_iter().cloned().collect(),
            settlement: self.settlement_at(coord).cloned(),
            effects: self.effects_at(coord).into_iter().cloned().collect(),
        })
    }
}
