//! Keeps every player's memory in step with what that player can see.
//!
//! [`ReplicationEngine::publish`] runs after each world mutation in three
//! passes per player: removals seen under the old visibility, a vision
//! refresh (resync of newly visible cells, `CellHidden` for the rest), then a
//! diff of the affected cells under the new visibility. Every record emitted
//! is applied to the player's memory and queued in their outbox, in order.

use std::collections::{BTreeSet, VecDeque};

use overland_protocol::{
    Coordinate, PlayerId, RemovalReason, SettlementRecord, UnitRecord, UpdateRecord,
};

use crate::error::ConsistencyError;
use crate::memory::PlayerMemory;
use crate::visibility::visible_cells;
use crate::world::{Change, World};

#[derive(Clone, Debug)]
struct PlayerReplica {
    memory: PlayerMemory,
    visible: BTreeSet<Coordinate>,
    outbox: VecDeque<UpdateRecord>,
}

#[derive(Clone, Debug)]
pub struct ReplicationEngine {
    replicas: Vec<PlayerReplica>,
}

impl ReplicationEngine {
    pub fn new(world: &World) -> Self {
        let replicas = world
            .player_ids()
            .map(|id| PlayerReplica {
                memory: PlayerMemory::new(id, world.shape()),
                visible: BTreeSet::new(),
                outbox: VecDeque::new(),
            })
            .collect();
        let mut engine = Self { replicas };
        let turn = world.turn();
        for index in 0..engine.replicas.len() {
            engine.emit(index, UpdateRecord::TurnStarted { turn });
            for player in world.players() {
                engine.emit(
                    index,
                    UpdateRecord::PlayerUpdated {
                        player: player.clone(),
                    },
                );
            }
        }
        engine.refresh_all(world);
        engine
    }

    pub fn memory(&self, player: PlayerId) -> Option<&PlayerMemory> {
        self.replicas.get(player.index()).map(|r| &r.memory)
    }

    pub fn visible(&self, player: PlayerId) -> Option<&BTreeSet<Coordinate>> {
        self.replicas.get(player.index()).map(|r| &r.visible)
    }

    pub fn pending(&self, player: PlayerId) -> usize {
        self.replicas
            .get(player.index())
            .map_or(0, |r| r.outbox.len())
    }

    /// Takes everything queued for `player`, oldest first.
    pub fn drain_outbox(&mut self, player: PlayerId) -> Vec<UpdateRecord> {
        self.replicas
            .get_mut(player.index())
            .map(|r| r.outbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Queues a notice that carries no world state (combat lifecycle).
    pub fn notify(&mut self, player: PlayerId, record: UpdateRecord) {
        if let Some(replica) = self.replicas.get_mut(player.index()) {
            replica.outbox.push_back(record);
        }
    }

    pub fn publish(&mut self, world: &World, change: &Change) {
        for index in 0..self.replicas.len() {
            self.depart(index, change);
        }
        if change.touches_vision() {
            self.refresh_all(world);
        }
        for index in 0..self.replicas.len() {
            self.arrive(world, index, change);
        }
    }

    /// Recomputes every player's visible cells, resyncing what came into view.
    pub fn refresh_all(&mut self, world: &World) {
        for index in 0..self.replicas.len() {
            self.refresh_player(world, index);
        }
    }

    /// Memory of every visible cell equals the world, and visibility is current.
    pub fn check_soundness(&self, world: &World) -> Result<(), ConsistencyError> {
        for replica in &self.replicas {
            let player = replica.memory.owner();
            let expected = visible_cells(world, player);
            if let Some(coord) = expected.symmetric_difference(&replica.visible).next() {
                return Err(ConsistencyError::MemoryMismatch {
                    player,
                    coord: *coord,
                });
            }
            for coord in &replica.visible {
                let remembered = replica.memory.view(*coord);
                let visible_flag = replica.memory.cell(*coord).is_some_and(|c| c.visible);
                if !visible_flag || remembered != world.cell_view(*coord) {
                    return Err(ConsistencyError::MemoryMismatch {
                        player,
                        coord: *coord,
                    });
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, index: usize, record: UpdateRecord) {
        let replica = &mut self.replicas[index];
        replica.memory.apply(&record);
        replica.outbox.push_back(record);
    }

    fn sees(&self, index: usize, coord: Coordinate) -> bool {
        self.replicas[index].visible.contains(&coord)
    }

    fn depart(&mut self, index: usize, change: &Change) {
        let memory = &self.replicas[index].memory;
        let (record, at) = match *change {
            Change::UnitRemoved { urn, at, reason } if memory.unit(urn).is_some() => {
                (UpdateRecord::UnitRemoved { urn, at, reason }, at)
            }
            Change::SettlementRemoved { urn, at } if memory.settlement(urn).is_some() => {
                (UpdateRecord::SettlementRemoved { urn, at }, at)
            }
            Change::EffectRemoved { id, at, .. } if memory.effect(id).is_some() => {
                (UpdateRecord::EffectRemoved { id, at }, at)
            }
            _ => return,
        };
        if self.sees(index, at) {
            self.emit(index, record);
        }
    }

    fn refresh_player(&mut self, world: &World, index: usize) {
        let player = self.replicas[index].memory.owner();
        let now = visible_cells(world, player);
        let before = std::mem::replace(&mut self.replicas[index].visible, now);
        let entered: Vec<Coordinate> = self.replicas[index]
            .visible
            .difference(&before)
            .copied()
            .collect();
        let left: Vec<Coordinate> = before
            .difference(&self.replicas[index].visible)
            .copied()
            .collect();

        if !entered.is_empty() || !left.is_empty() {
            tracing::debug!(
                player = player.0,
                entered = entered.len(),
                left = left.len(),
                "visibility changed"
            );
        }

        for coord in entered {
            if let Some(cell) = world.map().record(coord) {
                self.emit(
                    index,
                    UpdateRecord::CellRevealed {
                        cell,
                        turn: world.turn(),
                    },
                );
            }
            self.sync_cell(world, index, coord);
        }
        for coord in left {
            self.emit(index, UpdateRecord::CellHidden { coord });
        }
    }

    fn arrive(&mut self, world: &World, index: usize, change: &Change) {
        let affected: Vec<Coordinate> = match *change {
            Change::UnitCreated { urn } | Change::UnitUpdated { urn, .. } => {
                world.unit(urn).map(|u| u.location).into_iter().collect()
            }
            Change::UnitMoved { from, to, .. } => vec![from, to],
            Change::UnitRemoved { at, .. }
            | Change::SettlementRemoved { at, .. }
            | Change::EffectRemoved { at, .. } => vec![at],
            Change::SettlementUpdated { urn } => world
                .settlement(urn)
                .map(|s| s.location)
                .into_iter()
                .collect(),
            Change::CellUpdated { coord } => vec![coord],
            Change::EffectAdded { id, .. } => {
                world.effect(id).map(|e| e.anchor).into_iter().collect()
            }
            Change::PlayerUpdated { player } => {
                if let Some(public) = world.player(player) {
                    if self.replicas[index].memory.player(player) != Some(public) {
                        self.emit(
                            index,
                            UpdateRecord::PlayerUpdated {
                                player: public.clone(),
                            },
                        );
                    }
                }
                Vec::new()
            }
            Change::TurnStarted { turn } => {
                self.emit(index, UpdateRecord::TurnStarted { turn });
                Vec::new()
            }
        };
        for coord in affected {
            if self.sees(index, coord) {
                self.sync_cell(world, index, coord);
            }
        }
    }

    /// Brings the memory of one visible cell in line with the world, emitting the smallest records.
    fn sync_cell(&mut self, world: &World, index: usize, coord: Coordinate) {
        let Some(view) = world.cell_view(coord) else {
            return;
        };

        let remembered_cell = self.replicas[index].memory.cell(coord).map(|c| &c.record);
        if remembered_cell != Some(&view.cell) {
            self.emit(
                index,
                UpdateRecord::CellPatched {
                    cell: view.cell.clone(),
                },
            );
        }

        // Units remembered here that are no longer here.
        let stale: Vec<UnitRecord> = self.replicas[index]
            .memory
            .units_at(coord)
            .into_iter()
            .filter(|m| !view.units.iter().any(|u| u.urn == m.urn))
            .cloned()
            .collect();
        for gone in stale {
            match world.unit(gone.urn) {
                Some(unit) if unit.is_on_map() && self.sees(index, unit.location) => {
                    self.sync_unit(index, unit.record(gone.urn));
                }
                Some(_) => self.emit(
                    index,
                    UpdateRecord::UnitLeftView {
                        urn: gone.urn,
                        last_seen: coord,
                    },
                ),
                None if world.is_tombstoned(gone.urn) => self.emit(
                    index,
                    UpdateRecord::UnitRemoved {
                        urn: gone.urn,
                        at: coord,
                        reason: RemovalReason::Died,
                    },
                ),
                None => self.emit(
                    index,
                    UpdateRecord::UnitLeftView {
                        urn: gone.urn,
                        last_seen: coord,
                    },
                ),
            }
        }
        for unit in view.units {
            self.sync_unit(index, unit);
        }

        let remembered_settlement = self.replicas[index]
            .memory
            .settlement_at(coord)
            .map(|s| s.urn);
        if let Some(urn) = remembered_settlement {
            if view.settlement.as_ref().map(|s| s.urn) != Some(urn) {
                self.emit(index, UpdateRecord::SettlementRemoved { urn, at: coord });
            }
        }
        if let Some(settlement) = view.settlement {
            self.sync_settlement(index, settlement);
        }

        let stale_effects: Vec<_> = self.replicas[index]
            .memory
            .effects_at(coord)
            .into_iter()
            .filter(|m| !view.effects.iter().any(|e| e.id == m.id))
            .map(|m| m.id)
            .collect();
        for id in stale_effects {
            self.emit(index, UpdateRecord::EffectRemoved { id, at: coord });
        }
        for effect in view.effects {
            if self.replicas[index].memory.effect(effect.id) != Some(&effect) {
                self.emit(index, UpdateRecord::EffectAdded { effect });
            }
        }
    }

    fn sync_unit(&mut self, index: usize, current: UnitRecord) {
        let record = match self.replicas[index].memory.unit(current.urn) {
            None => UpdateRecord::UnitUpserted { unit: current },
            Some(known) if *known == current => return,
            Some(known) if is_pure_move(known, &current) => UpdateRecord::UnitMoved {
                urn: current.urn,
                from: known.location,
                to: current.location,
                moves_left: current.moves_left,
            },
            Some(known) if is_pure_patch(known, &current) => UpdateRecord::UnitPatched {
                urn: current.urn,
                hit_points: current.hit_points,
                moves_left: current.moves_left,
                status: current.status,
                combat: current.combat,
            },
            Some(_) => UpdateRecord::UnitUpserted { unit: current },
        };
        self.emit(index, record);
    }

    fn sync_settlement(&mut self, index: usize, current: SettlementRecord) {
        let record = match self.replicas[index].memory.settlement(current.urn) {
            None => UpdateRecord::SettlementUpserted {
                settlement: current,
            },
            Some(known) if *known == current => return,
            Some(known)
                if SettlementRecord {
                    owner: current.owner,
                    ..known.clone()
                } == current =>
            {
                UpdateRecord::SettlementOwnerChanged {
                    urn: current.urn,
                    owner: current.owner,
                }
            }
            Some(_) => UpdateRecord::SettlementPatched {
                settlement: current,
            },
        };
        self.emit(index, record);
    }
}

fn is_pure_move(known: &UnitRecord, current: &UnitRecord) -> bool {
    known.location != current.location
        && UnitRecord {
            location: current.location,
            moves_left: current.moves_left,
            ..known.clone()
        } == *current
}

fn is_pure_patch(known: &UnitRecord, current: &UnitRecord) -> bool {
    UnitRecord {
        hit_points: current.hit_points,
        moves_left: current.moves_left,
        status: current.status,
        combat: current.combat,
        ..known.clone()
    } == *current
}

#[cfg(test)]
mod tests {
    use overland_protocol::{TerrainKind, UnitStatus};

    use super::*;
    use crate::map::{MapShape, OverlandMap};
    use crate::rules::{load_rules, RulesSource};
    use crate::world::PlayerSetup;

    const A: PlayerId = PlayerId(0);
    const B: PlayerId = PlayerId(1);

    fn setup() -> (World, ReplicationEngine) {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let map = OverlandMap::new(MapShape::new(16, 8, 1, false), TerrainKind::Grassland);
        let world = World::new(rules, map, vec![PlayerSetup::human("A"), PlayerSetup::human("B")]);
        let repl = ReplicationEngine::new(&world);
        (world, repl)
    }

    #[test]
    fn first_sighting_is_an_upsert_then_moves_are_patches() {
        let (mut world, mut repl) = setup();
        let mut w = world.writer(&mut repl);
        w.spawn_unit(A, "spearmen", Coordinate::new(3, 3, 0))
            .expect("spawn");
        let scout = w
            .spawn_unit(B, "spearmen", Coordinate::new(6, 3, 0))
            .expect("spawn");
        repl.drain_outbox(A);

        // Out of sight, into sight, then within sight.
        for step in [(5, 3), (4, 3), (4, 2)] {
            world
                .writer(&mut repl)
                .move_unit(scout, Coordinate::new(step.0, step.1, 0), 0)
                .expect("move");
        }

        let seen = repl.drain_outbox(A);
        let unit_records: Vec<_> = seen.iter().filter(|r| r.unit_urn() == Some(scout)).collect();
        assert_eq!(unit_records.len(), 2);
        assert!(matches!(unit_records[0], UpdateRecord::UnitUpserted { .. }));
        assert!(matches!(unit_records[1], UpdateRecord::UnitMoved { .. }));
        assert!(repl.check_soundness(&world).is_ok());
    }

    #[test]
    fn hidden_cells_stay_stale_until_seen_again() {
        let (mut world, mut repl) = setup();
        let watcher = world
            .writer(&mut repl)
            .spawn_unit(A, "spearmen", Coordinate::new(3, 3, 0))
            .expect("spawn");
        let other = world
            .writer(&mut repl)
            .spawn_unit(B, "spearmen", Coordinate::new(4, 3, 0))
            .expect("spawn");
        assert!(repl.memory(A).and_then(|m| m.unit(other)).is_some());

        // A walks away; B's unit drops out of sight but stays remembered.
        world
            .writer(&mut repl)
            .move_unit(watcher, Coordinate::new(0, 3, 0), 0)
            .expect("move");
        world
            .writer(&mut repl)
            .damage_unit(other, 4)
            .expect("damage");
        let remembered = repl.memory(A).and_then(|m| m.unit(other)).cloned();
        assert_eq!(remembered.map(|u| u.hit_points), Some(10));
        assert!(repl.check_soundness(&world).is_ok());

        // Coming back refreshes the stale record.
        world
            .writer(&mut repl)
            .move_unit(watcher, Coordinate::new(3, 3, 0), 0)
            .expect("move");
        let refreshed = repl.memory(A).and_then(|m| m.unit(other)).cloned();
        assert_eq!(refreshed.map(|u| u.hit_points), Some(6));
        assert!(repl.check_soundness(&world).is_ok());
    }

    #[test]
    fn deaths_in_view_are_removals_not_departures() {
        let (mut world, mut repl) = setup();
        world
            .writer(&mut repl)
            .spawn_unit(A, "spearmen", Coordinate::new(3, 3, 0))
            .expect("spawn");
        let victim = world
            .writer(&mut repl)
            .spawn_unit(B, "spearmen", Coordinate::new(4, 4, 0))
            .expect("spawn");
        repl.drain_outbox(A);
        repl.drain_outbox(B);

        world.writer(&mut repl).kill_unit(victim).expect("kill");
        let a_saw = repl.drain_outbox(A);
        assert!(a_saw.iter().any(|r| matches!(
            r,
            UpdateRecord::UnitRemoved { urn, reason: RemovalReason::Died, .. } if *urn == victim
        )));
        // B lost its only vision source: removal first, then the cells go dark.
        let b_saw = repl.drain_outbox(B);
        assert!(matches!(b_saw[0], UpdateRecord::UnitRemoved { .. }));
        assert!(b_saw[1..]
            .iter()
            .all(|r| matches!(r, UpdateRecord::CellHidden { .. })));
        assert!(repl.check_soundness(&world).is_ok());
    }

    #[test]
    fn public_player_changes_reach_everyone() {
        let (mut world, mut repl) = setup();
        repl.drain_outbox(B);
        world.writer(&mut repl).adjust_fame(A, 3);
        let b_saw = repl.drain_outbox(B);
        assert_eq!(b_saw.len(), 1);
        assert!(matches!(&b_saw[0], UpdateRecord::PlayerUpdated { player } if player.fame == 3));
    }

    #[test]
    fn generated_units_are_invisible_until_placed() {
        let (mut world, mut repl) = setup();
        world
            .writer(&mut repl)
            .spawn_unit(A, "spearmen", Coordinate::new(3, 3, 0))
            .expect("spawn");
        let recruit = world
            .writer(&mut repl)
            .spawn_generated_unit(A, "swordsmen", Coordinate::new(3, 3, 0))
            .expect("spawn");
        assert!(repl.memory(A).and_then(|m| m.unit(recruit)).is_none());
        world
            .writer(&mut repl)
            .place_generated_unit(recruit, Coordinate::new(3, 4, 0))
            .expect("place");
        let known = repl.memory(A).and_then(|m| m.unit(recruit)).cloned();
        assert_eq!(known.map(|u| u.status), Some(UnitStatus::Alive));
        assert!(repl.check_soundness(&world).is_ok());
    }
}
