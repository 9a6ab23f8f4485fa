//! Reachability for a stack sharing one movement budget.
//!
//! One uniform-cost search serves the overland map (over any
//! [`TerrainKnowledge`]: a player's memory for planning, the world for
//! execution) and the combat grid. Neighbors are expanded in [`Direction`]
//! order and equal-cost ties keep the earlier direction, so results are
//! deterministic for identical inputs.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use overland_protocol::{CombatPos, Coordinate, Direction, PlayerId, TerrainKind, Urn};

use crate::combat::{Combat, CombatSpace};
use crate::error::ValidationError;
use crate::map::{self, MapShape};
use crate::memory::PlayerMemory;
use crate::rules::{Abilities, Rules};
use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reachability {
    Unreachable,
    ReachableThisTurn,
    ReachableOnlyOverMultipleTurns,
    ReachableButTriggersEncounter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    /// Movement left this turn (doubled units).
    pub remaining: i32,
    pub per_turn: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReachCell<N> {
    pub cost: i32,
    /// Direction of the last step into this cell; `None` at the origin.
    pub direction: Option<Direction>,
    pub from: Option<N>,
    pub class: Reachability,
    pub within_budget: bool,
    /// Turn boundaries the trip crosses (0 when reachable this turn).
    pub turns: u32,
}

#[derive(Clone, Debug)]
pub struct ReachabilityGrid<N> {
    origin: N,
    cells: BTreeMap<N, ReachCell<N>>,
}

impl<N: Copy + Ord> ReachabilityGrid<N> {
    pub fn origin(&self) -> N {
        self.origin
    }

    pub fn get(&self, node: N) -> Option<&ReachCell<N>> {
        self.cells.get(&node)
    }

    pub fn classification(&self, node: N) -> Reachability {
        self.cells
            .get(&node)
            .map_or(Reachability::Unreachable, |c| c.class)
    }

    pub fn cost(&self, node: N) -> Option<i32> {
        self.cells.get(&node).map(|c| c.cost)
    }

    pub fn cells(&self) -> impl Iterator<Item = (N, &ReachCell<N>)> {
        self.cells.iter().map(|(n, c)| (*n, c))
    }

    pub fn this_turn_cells(&self) -> Vec<N> {
        self.cells
            .iter()
            .filter(|(_, c)| c.class == Reachability::ReachableThisTurn)
            .map(|(n, _)| *n)
            .collect()
    }

    /// Origin-to-target path following the recorded steps, both ends included.
    pub fn path_to(&self, target: N) -> Option<Vec<N>> {
        let mut path = vec![target];
        let mut cursor = self.cells.get(&target)?;
        while let Some(prev) = cursor.from {
            path.push(prev);
            cursor = self.cells.get(&prev)?;
            if path.len() > self.cells.len() + 1 {
                return None;
            }
        }
        path.reverse();
        (path.first() == Some(&self.origin)).then_some(path)
    }
}

/// A finite graph the search runs over.
pub trait SearchSpace {
    type Node: Copy + Ord;

    fn len(&self) -> usize;
    fn index_of(&self, node: Self::Node) -> Option<usize>;
    fn node_at(&self, index: usize) -> Option<Self::Node>;
    /// Neighbors in enumeration order.
    fn neighbors(&self, node: Self::Node, out: &mut Vec<(Direction, Self::Node)>);
    /// `None` when the step is impossible (impassable, unknown, full).
    fn enter_cost(&self, from: Self::Node, to: Self::Node) -> Option<i32>;
    /// Entering starts a fight; such cells are reported but never expanded.
    fn triggers_encounter(&self, node: Self::Node) -> bool;
}

pub fn search<S: SearchSpace>(space: &S, origin: S::Node, budget: Budget) -> ReachabilityGrid<S::Node> {
    let mut cells = BTreeMap::new();
    cells.insert(
        origin,
        ReachCell {
            cost: 0,
            direction: None,
            from: None,
            class: Reachability::ReachableThisTurn,
            within_budget: true,
            turns: 0,
        },
    );
    let Some(start) = space.index_of(origin) else {
        return ReachabilityGrid { origin, cells };
    };
    // Nothing left this turn: only the origin counts as reachable.
    if budget.remaining <= 0 || budget.per_turn <= 0 {
        return ReachabilityGrid { origin, cells };
    }

    let len = space.len();
    let mut dist = vec![i32::MAX; len];
    let mut prev: Vec<Option<(usize, Direction)>> = vec![None; len];
    let mut encounter = vec![false; len];
    dist[start] = 0;

    let mut heap: BinaryHeap<Reverse<(i32, usize)>> = BinaryHeap::new();
    heap.push(Reverse((0, start)));
    let mut scratch = Vec::with_capacity(10);

    while let Some(Reverse((cost, index))) = heap.pop() {
        if cost != dist[index] {
            continue;
        }
        if index != start && encounter[index] {
            continue;
        }
        let Some(node) = space.node_at(index) else {
            continue;
        };

        space.neighbors(node, &mut scratch);
        for (direction, neighbor) in scratch.drain(..) {
            let Some(next) = space.index_of(neighbor) else {
                continue;
            };
            if next == start {
                continue;
            }
            let Some(step_cost) = space.enter_cost(node, neighbor) else {
                continue;
            };
            let new_cost = cost.saturating_add(step_cost);
            if new_cost < dist[next] {
                dist[next] = new_cost;
                prev[next] = Some((index, direction));
                encounter[next] = space.triggers_encounter(neighbor);
                heap.push(Reverse((new_cost, next)));
            } else if new_cost == dist[next] {
                let better = prev[next].is_some_and(|(_, d)| direction.rank() < d.rank());
                if better {
                    prev[next] = Some((index, direction));
                }
            }
        }
    }

    for (index, cost) in dist.iter().copied().enumerate() {
        if index == start || cost == i32::MAX {
            continue;
        }
        let (Some(node), Some((from, direction))) = (space.node_at(index), prev[index]) else {
            continue;
        };
        let within_budget = cost <= budget.remaining;
        let (class, turns) = if encounter[index] {
            (
                Reachability::ReachableButTriggersEncounter,
                turns_needed(cost, budget),
            )
        } else if within_budget {
            (Reachability::ReachableThisTurn, 0)
        } else {
            (
                Reachability::ReachableOnlyOverMultipleTurns,
                turns_needed(cost, budget),
            )
        };
        cells.insert(
            node,
            ReachCell {
                cost,
                direction: Some(direction),
                from: space.node_at(from),
                class,
                within_budget,
                turns,
            },
        );
    }

    ReachabilityGrid { origin, cells }
}

/// Turn boundaries crossed: the rest of this turn, then whole turns.
fn turns_needed(cost: i32, budget: Budget) -> u32 {
    if cost <= budget.remaining || budget.per_turn <= 0 {
        return 0;
    }
    let beyond = (cost - budget.remaining.max(0)) as i64;
    let per_turn = budget.per_turn as i64;
    ((beyond + per_turn - 1) / per_turn) as u32
}

/// What a searcher knows about the overland map.
pub trait TerrainKnowledge {
    fn shape(&self) -> MapShape;
    /// `None` for cells never seen.
    fn terrain(&self, coord: Coordinate) -> Option<TerrainKind>;
    fn road(&self, coord: Coordinate) -> bool;
    fn tower(&self, coord: Coordinate) -> bool;
    fn hostile_to(&self, viewer: PlayerId, coord: Coordinate) -> bool;
    fn friendly_units(&self, viewer: PlayerId, coord: Coordinate) -> usize;
}

impl TerrainKnowledge for World {
    fn shape(&self) -> MapShape {
        World::shape(self)
    }

    fn terrain(&self, coord: Coordinate) -> Option<TerrainKind> {
        self.map().terrain(coord)
    }

    fn road(&self, coord: Coordinate) -> bool {
        self.map().get(coord).is_some_and(|c| c.road)
    }

    fn tower(&self, coord: Coordinate) -> bool {
        self.map().has_tower(coord)
    }

    fn hostile_to(&self, viewer: PlayerId, coord: Coordinate) -> bool {
        self.is_hostile_to(viewer, coord)
    }

    fn friendly_units(&self, viewer: PlayerId, coord: Coordinate) -> usize {
        self.units_at(coord)
            .iter()
            .filter(|(_, u)| u.owner == viewer)
            .count()
    }
}

impl TerrainKnowledge for PlayerMemory {
    fn shape(&self) -> MapShape {
        PlayerMemory::shape(self)
    }

    fn terrain(&self, coord: Coordinate) -> Option<TerrainKind> {
        self.cell(coord).map(|c| c.record.terrain)
    }

    fn road(&self, coord: Coordinate) -> bool {
        self.cell(coord).is_some_and(|c| c.record.road)
    }

    fn tower(&self, coord: Coordinate) -> bool {
        self.cell(coord).is_some_and(|c| c.record.tower)
    }

    fn hostile_to(&self, viewer: PlayerId, coord: Coordinate) -> bool {
        if self.units_at(coord).iter().any(|u| u.owner != viewer) {
            return true;
        }
        if self.settlement_at(coord).is_some_and(|s| s.owner != viewer) {
            return true;
        }
        self.cell(coord).is_some_and(|c| c.record.hazard.is_some())
    }

    fn friendly_units(&self, viewer: PlayerId, coord: Coordinate) -> usize {
        self.units_at(coord)
            .iter()
            .filter(|u| u.owner == viewer)
            .count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackMember {
    pub urn: Urn,
    pub remaining: i32,
    pub per_turn: i32,
    pub abilities: Abilities,
}

/// The movement-relevant view of units travelling together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackProfile {
    pub owner: PlayerId,
    pub members: Vec<StackMember>,
}

impl StackProfile {
    pub fn from_world(world: &World, units: &[Urn]) -> Result<Self, ValidationError> {
        let mut owner = None;
        let mut members = Vec::with_capacity(units.len());
        for urn in units {
            let unit = world.unit(*urn).ok_or(ValidationError::UnknownUnit(*urn))?;
            owner.get_or_insert(unit.owner);
            members.push(StackMember {
                urn: *urn,
                remaining: unit.moves_left,
                per_turn: unit.moves_per_turn,
                abilities: unit.abilities,
            });
        }
        let owner = owner.ok_or(ValidationError::EmptyStack)?;
        Ok(Self { owner, members })
    }

    /// The stack moves at its slowest member's pace.
    pub fn budget(&self) -> Budget {
        Budget {
            remaining: self.members.iter().map(|m| m.remaining).min().unwrap_or(0),
            per_turn: self.members.iter().map(|m| m.per_turn).min().unwrap_or(0),
        }
    }

    /// Cost for the whole stack to enter a cell: the slowest member's cost.
    pub fn entry_cost(&self, rules: &Rules, terrain: TerrainKind, road: bool) -> Option<i32> {
        if self.members.is_empty() {
            return None;
        }
        if terrain.is_water() {
            let capacity: u32 = self
                .members
                .iter()
                .filter(|m| m.abilities.sailing)
                .map(|m| u32::from(m.abilities.transport))
                .sum();
            let passengers = self
                .members
                .iter()
                .filter(|m| !m.abilities.crosses_water())
                .count() as u32;
            if passengers > capacity {
                return None;
            }
            // Carried units ride at the ship's rate.
            self.members
                .iter()
                .filter(|m| m.abilities.crosses_water())
                .map(|m| member_cost(rules, &m.abilities, terrain, road))
                .max()
        } else {
            let mut worst = 0;
            for member in &self.members {
                let a = &member.abilities;
                if a.sailing && !a.flying && !a.swimming {
                    return None;
                }
                worst = worst.max(member_cost(rules, a, terrain, road));
            }
            Some(worst)
        }
    }
}

fn member_cost(rules: &Rules, abilities: &Abilities, terrain: TerrainKind, road: bool) -> i32 {
    if abilities.flying {
        return rules.flying_cost;
    }
    if terrain.is_water() {
        return rules.terrain_cost(terrain);
    }
    if road {
        return rules.road_cost;
    }
    let base = rules.terrain_cost(terrain);
    let skilled = abilities.pathfinding
        || (abilities.forester && terrain == TerrainKind::Forest)
        || (abilities.mountaineer
            && matches!(terrain, TerrainKind::Hills | TerrainKind::Mountains));
    if skilled {
        base.min(rules.skilled_cost)
    } else {
        base
    }
}

/// The overland map as seen through one knowledge source, for one stack.
pub struct OverlandSpace<'a, K: TerrainKnowledge> {
    knowledge: &'a K,
    rules: &'a Rules,
    stack: &'a StackProfile,
    shape: MapShape,
}

impl<'a, K: TerrainKnowledge> OverlandSpace<'a, K> {
    pub fn new(knowledge: &'a K, rules: &'a Rules, stack: &'a StackProfile) -> Self {
        Self {
            shape: knowledge.shape(),
            knowledge,
            rules,
            stack,
        }
    }
}

impl<K: TerrainKnowledge> SearchSpace for OverlandSpace<'_, K> {
    type Node = Coordinate;

    fn len(&self) -> usize {
        self.shape.len()
    }

    fn index_of(&self, node: Coordinate) -> Option<usize> {
        self.shape.index_of(node)
    }

    fn node_at(&self, index: usize) -> Option<Coordinate> {
        self.shape.coordinate_at(index)
    }

    fn neighbors(&self, node: Coordinate, out: &mut Vec<(Direction, Coordinate)>) {
        map::neighbors(&self.shape, node, self.knowledge.tower(node), out);
    }

    fn enter_cost(&self, _from: Coordinate, to: Coordinate) -> Option<i32> {
        let terrain = self.knowledge.terrain(to)?;
        let owner = self.stack.owner;
        if !self.knowledge.hostile_to(owner, to) {
            let crowd = self.knowledge.friendly_units(owner, to) + self.stack.members.len();
            if crowd > self.rules.stack_limit {
                return None;
            }
        }
        self.stack
            .entry_cost(self.rules, terrain, self.knowledge.road(to))
    }

    fn triggers_encounter(&self, node: Coordinate) -> bool {
        self.knowledge.hostile_to(self.stack.owner, node)
    }
}

/// Reachability of every cell for `stack` starting at `from`.
pub fn compute_reachability<K: TerrainKnowledge>(
    rules: &Rules,
    stack: &StackProfile,
    from: Coordinate,
    budget: Budget,
    knowledge: &K,
) -> ReachabilityGrid<Coordinate> {
    search(&OverlandSpace::new(knowledge, rules, stack), from, budget)
}

/// Squares one combatant can reach on its combat grid this turn.
pub fn compute_combat_reachability(
    combat: &Combat,
    unit: Urn,
) -> Option<ReachabilityGrid<CombatPos>> {
    let combatant = combat.combatant(unit)?;
    let space = CombatSpace::new(combat, unit)?;
    let budget = Budget {
        remaining: combatant.moves_left,
        per_turn: combatant.moves_per_turn,
    };
    Some(search(&space, combatant.pos, budget))
}

#[cfg(test)]
mod tests {
    use overland_protocol::HazardKind;

    use super::*;
    use crate::map::OverlandMap;
    use crate::replication::ReplicationEngine;
    use crate::rules::{load_rules, RulesSource};
    use crate::world::PlayerSetup;

    const A: PlayerId = PlayerId(0);
    const B: PlayerId = PlayerId(1);

    fn setup(map: OverlandMap) -> (World, ReplicationEngine) {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let world = World::new(rules, map, vec![PlayerSetup::human("A"), PlayerSetup::human("B")]);
        let repl = ReplicationEngine::new(&world);
        (world, repl)
    }

    fn grass(w: u32, h: u32, planes: u8) -> OverlandMap {
        OverlandMap::new(MapShape::new(w, h, planes, false), TerrainKind::Grassland)
    }

    fn stack(world: &mut World, repl: &mut ReplicationEngine, kinds: &[&str], at: Coordinate) -> Vec<Urn> {
        let mut w = world.writer(repl);
        kinds
            .iter()
            .map(|k| w.spawn_unit(A, k, at).expect("spawn"))
            .collect()
    }

    #[test]
    fn stack_budget_is_the_slowest_member() {
        let (mut world, mut repl) = setup(grass(10, 10, 1));
        let origin = Coordinate::new(5, 5, 0);
        let urns = stack(&mut world, &mut repl, &["spearmen", "cavalry", "scouts"], origin);
        {
            let mut w = world.writer(&mut repl);
            w.set_unit_moves(urns[1], 3).expect("moves");
        }
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        assert_eq!(profile.budget(), Budget { remaining: 2, per_turn: 2 });

        let grid = compute_reachability(world.rules(), &profile, origin, profile.budget(), &world);
        let this_turn = grid.this_turn_cells();
        assert_eq!(this_turn.len(), 9);
        for cell in this_turn {
            assert!(world.shape().distance(origin, cell).is_some_and(|d| d <= 1));
        }
        assert_eq!(
            grid.classification(Coordinate::new(7, 5, 0)),
            Reachability::ReachableOnlyOverMultipleTurns
        );
        assert_eq!(grid.get(Coordinate::new(7, 5, 0)).map(|c| c.turns), Some(1));
    }

    #[test]
    fn zero_per_turn_budget_reaches_only_the_origin() {
        let (mut world, mut repl) = setup(grass(6, 6, 1));
        let origin = Coordinate::new(2, 2, 0);
        let urns = stack(&mut world, &mut repl, &["spearmen"], origin);
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        let grid = compute_reachability(
            world.rules(),
            &profile,
            origin,
            Budget { remaining: 0, per_turn: 0 },
            &world,
        );
        assert_eq!(grid.cells().count(), 1);
        assert_eq!(grid.classification(origin), Reachability::ReachableThisTurn);
        assert_eq!(grid.classification(Coordinate::new(3, 2, 0)), Reachability::Unreachable);
    }

    #[test]
    fn spent_stack_reaches_only_the_origin() {
        let (mut world, mut repl) = setup(grass(12, 12, 1));
        let origin = Coordinate::new(5, 5, 0);
        let urns = stack(&mut world, &mut repl, &["cavalry"], origin);
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        let grid = compute_reachability(
            world.rules(),
            &profile,
            origin,
            Budget { remaining: 0, per_turn: 4 },
            &world,
        );
        assert_eq!(grid.classification(origin), Reachability::ReachableThisTurn);
        assert_eq!(grid.classification(Coordinate::new(6, 5, 0)), Reachability::Unreachable);
        assert_eq!(grid.cells().count(), 1);
    }

    #[test]
    fn more_budget_never_shrinks_this_turn_set() {
        let mut map = grass(12, 12, 1);
        map.set_terrain(Coordinate::new(6, 5, 0), TerrainKind::Forest);
        map.set_terrain(Coordinate::new(4, 4, 0), TerrainKind::Mountains);
        map.set_road(Coordinate::new(5, 6, 0), true);
        let (mut world, mut repl) = setup(map);
        let origin = Coordinate::new(5, 5, 0);
        let urns = stack(&mut world, &mut repl, &["cavalry"], origin);
        let profile = StackProfile::from_world(&world, &urns).expect("profile");

        let mut previous: Vec<Coordinate> = Vec::new();
        for remaining in 0..=12 {
            let grid = compute_reachability(
                world.rules(),
                &profile,
                origin,
                Budget { remaining, per_turn: 4 },
                &world,
            );
            let now = grid.this_turn_cells();
            assert!(previous.iter().all(|c| now.contains(c)), "budget {remaining}");
            previous = now;
        }
    }

    #[test]
    fn identical_inputs_give_identical_grids_and_paths() {
        let (mut world, mut repl) = setup(grass(10, 10, 1));
        let origin = Coordinate::new(1, 1, 0);
        let urns = stack(&mut world, &mut repl, &["cavalry"], origin);
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        let budget = Budget { remaining: 4, per_turn: 4 };
        let a = compute_reachability(world.rules(), &profile, origin, budget, &world);
        let b = compute_reachability(world.rules(), &profile, origin, budget, &world);
        let target = Coordinate::new(6, 1, 0);
        assert_eq!(a.path_to(target), b.path_to(target));
        let path = a.path_to(target).expect("path");
        assert_eq!(path.first(), Some(&origin));
        assert_eq!(path.last(), Some(&target));
        // East is enumerated before South-East and North-East on equal cost.
        assert_eq!(a.get(Coordinate::new(2, 1, 0)).and_then(|c| c.direction), Some(Direction::East));
    }

    #[test]
    fn hostiles_and_hazards_are_encounters_not_expanded() {
        let (mut world, mut repl) = setup(grass(10, 3, 1));
        let origin = Coordinate::new(0, 1, 0);
        let urns = stack(&mut world, &mut repl, &["cavalry"], origin);
        {
            let mut w = world.writer(&mut repl);
            for y in 0..3 {
                w.spawn_unit(B, "spearmen", Coordinate::new(3, y, 0)).expect("wall");
            }
            w.create_hazard(Coordinate::new(1, 0, 0), HazardKind::Lair, &["guardian"], &[])
                .expect("lair");
        }
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        let grid = compute_reachability(
            world.rules(),
            &profile,
            origin,
            Budget { remaining: 40, per_turn: 40 },
            &world,
        );
        assert_eq!(
            grid.classification(Coordinate::new(3, 1, 0)),
            Reachability::ReachableButTriggersEncounter
        );
        assert_eq!(
            grid.classification(Coordinate::new(1, 0, 0)),
            Reachability::ReachableButTriggersEncounter
        );
        assert_eq!(grid.classification(Coordinate::new(4, 1, 0)), Reachability::Unreachable);
    }

    #[test]
    fn unknown_cells_are_impassable_in_memory() {
        let (mut world, mut repl) = setup(grass(20, 5, 1));
        let origin = Coordinate::new(2, 2, 0);
        let urns = stack(&mut world, &mut repl, &["scouts"], origin);
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        let memory = repl.memory(A).expect("memory");
        let grid = compute_reachability(
            world.rules(),
            &profile,
            origin,
            Budget { remaining: 100, per_turn: 100 },
            memory,
        );
        // Scouts see two cells out; nothing beyond was ever revealed.
        assert_ne!(grid.classification(Coordinate::new(4, 2, 0)), Reachability::Unreachable);
        assert_eq!(grid.classification(Coordinate::new(5, 2, 0)), Reachability::Unreachable);
    }

    #[test]
    fn towers_connect_planes() {
        let mut map = grass(6, 6, 2);
        map.set_tower(3, 3);
        let (mut world, mut repl) = setup(map);
        let origin = Coordinate::new(2, 3, 0);
        let urns = stack(&mut world, &mut repl, &["cavalry"], origin);
        let profile = StackProfile::from_world(&world, &urns).expect("profile");
        let grid = compute_reachability(world.rules(), &profile, origin, profile.budget(), &world);
        let below = Coordinate::new(3, 3, 1);
        assert_eq!(grid.classification(below), Reachability::ReachableThisTurn);
        assert_eq!(grid.get(below).and_then(|c| c.direction), Some(Direction::Plane(1)));
    }

    #[test]
    fn ships_carry_walkers_over_water_but_not_onto_land() {
        let mut map = grass(8, 3, 1);
        for x in 2..8 {
            for y in 0..3 {
                map.set_terrain(Coordinate::new(x, y, 0), TerrainKind::Ocean);
            }
        }
        let (mut world, mut repl) = setup(map);
        let origin = Coordinate::new(2, 1, 0);
        let sailors = stack(&mut world, &mut repl, &["galley", "spearmen"], origin);
        let walker = &sailors[1..];

        let alone = StackProfile::from_world(&world, walker).expect("profile");
        let rules = world.rules();
        assert_eq!(alone.entry_cost(rules, TerrainKind::Ocean, false), None);

        let fleet = StackProfile::from_world(&world, &sailors).expect("profile");
        assert_eq!(fleet.entry_cost(rules, TerrainKind::Ocean, false), Some(2));
        assert_eq!(fleet.entry_cost(rules, TerrainKind::Grassland, false), None);
    }

    #[test]
    fn abilities_and_roads_lower_costs() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let member = |abilities: Abilities| StackProfile {
            owner: A,
            members: vec![StackMember {
                urn: Urn(1),
                remaining: 4,
                per_turn: 4,
                abilities,
            }],
        };
        let plain = member(Abilities::default());
        assert_eq!(plain.entry_cost(&rules, TerrainKind::Forest, false), Some(4));
        assert_eq!(plain.entry_cost(&rules, TerrainKind::Mountains, true), Some(1));
        let forester = member(Abilities { forester: true, ..Abilities::default() });
        assert_eq!(forester.entry_cost(&rules, TerrainKind::Forest, false), Some(2));
        let climber = member(Abilities { mountaineer: true, ..Abilities::default() });
        assert_eq!(climber.entry_cost(&rules, TerrainKind::Mountains, false), Some(2));
        let flyer = member(Abilities { flying: true, ..Abilities::default() });
        assert_eq!(flyer.entry_cost(&rules, TerrainKind::Ocean, false), Some(2));
        assert_eq!(flyer.entry_cost(&rules, TerrainKind::Grassland, true), Some(2));
    }
}
