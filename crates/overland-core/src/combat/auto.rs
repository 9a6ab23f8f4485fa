//! The auto-control policy: what an AI or auto-controlled side does with its turn.

use overland_protocol::{CombatId, CombatOrder, CombatPos, PlayerId, Urn};

use crate::combat::{Combat, SideKind};
use crate::movement::{compute_combat_reachability, Reachability};

/// A turn to be planned off the serialization point, against a frozen copy.
#[derive(Clone, Debug)]
pub struct AutoTurnJob {
    pub combat: CombatId,
    pub player: PlayerId,
    pub side: SideKind,
    /// Revision the snapshot was taken at; orders are rejected if the combat has moved on.
    pub revision: u64,
    pub snapshot: Combat,
}

impl AutoTurnJob {
    pub fn plan(&self) -> Vec<CombatOrder> {
        plan_turn(&self.snapshot, self.side)
    }
}

/// Orders for every unit of `side`, in URN order.
///
/// Units next to an enemy strike the weakest one; others close in on the
/// nearest enemy as far as their movement allows and strike if they arrive
/// adjacent; anything left passes.
pub fn plan_turn(combat: &Combat, side: SideKind) -> Vec<CombatOrder> {
    let mut sim = combat.clone();
    let mut orders = Vec::new();
    let movers: Vec<Urn> = sim.alive_on(side).map(|c| c.urn).collect();

    for urn in movers {
        let Some(unit) = sim.combatant(urn).cloned() else {
            continue;
        };
        if !unit.can_act() {
            orders.push(CombatOrder::Pass { unit: urn });
            continue;
        }

        if let Some(target) = weakest_adjacent(&sim, side, unit.pos) {
            orders.push(CombatOrder::Attack { unit: urn, target });
            mark_acted(&mut sim, urn);
            continue;
        }

        let here = nearest_enemy_distance(&sim, side, unit.pos);
        let best = compute_combat_reachability(&sim, urn).and_then(|grid| {
            grid.cells()
                .filter(|(pos, cell)| {
                    cell.class == Reachability::ReachableThisTurn && *pos != unit.pos
                })
                .filter_map(|(pos, cell)| {
                    let d = nearest_enemy_distance(&sim, side, pos)?;
                    Some((d, cell.cost, pos.y, pos.x, pos))
                })
                .min()
        });

        match (best, here) {
            (Some((d, cost, _, _, to)), Some(now)) if d < now => {
                orders.push(CombatOrder::Move { unit: urn, to });
                if let Some(c) = sim.combatants.get_mut(&urn) {
                    c.pos = to;
                    c.moves_left -= cost;
                }
                let still_able = sim.combatant(urn).is_some_and(|c| c.can_act());
                match weakest_adjacent(&sim, side, to) {
                    Some(target) if still_able => {
                        orders.push(CombatOrder::Attack { unit: urn, target });
                    }
                    _ => orders.push(CombatOrder::Pass { unit: urn }),
                }
            }
            _ => orders.push(CombatOrder::Pass { unit: urn }),
        }
        mark_acted(&mut sim, urn);
    }
    orders
}

fn mark_acted(sim: &mut Combat, urn: Urn) {
    if let Some(c) = sim.combatants.get_mut(&urn) {
        c.acted = true;
    }
}

fn weakest_adjacent(combat: &Combat, side: SideKind, pos: CombatPos) -> Option<Urn> {
    combat
        .adjacent_enemies(side, pos)
        .into_iter()
        .min_by_key(|c| (c.hit_points, c.urn))
        .map(|c| c.urn)
}

fn nearest_enemy_distance(combat: &Combat, side: SideKind, pos: CombatPos) -> Option<i32> {
    combat
        .alive_on(side.other())
        .map(|c| c.pos.distance(pos))
        .min()
}
