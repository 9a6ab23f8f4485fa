//! Data-driven game rules.
//!
//! Everything tunable (terrain costs, unit types, buildings, vision radii,
//! combat and reward constants) is loaded from YAML; see [`load_rules`].

mod loader;

use std::collections::BTreeMap;

use overland_protocol::TerrainKind;
use serde::Deserialize;

pub use loader::{load_rules, RulesError, RulesSource};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Abilities {
    pub flying: bool,
    pub swimming: bool,
    pub sailing: bool,
    /// Land units a sailing unit can carry.
    pub transport: u8,
    pub forester: bool,
    pub mountaineer: bool,
    pub pathfinding: bool,
}

impl Abilities {
    #[inline]
    pub fn crosses_water(&self) -> bool {
        self.flying || self.swimming || self.sailing
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawUnitType {
    moves: i32,
    hit_points: i32,
    attack: i32,
    defense: i32,
    #[serde(default)]
    vision: Option<i32>,
    #[serde(default)]
    hero: bool,
    #[serde(default)]
    abilities: Abilities,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitType {
    pub name: String,
    pub moves: i32,
    pub hit_points: i32,
    pub attack: i32,
    pub defense: i32,
    pub vision: i32,
    pub hero: bool,
    pub abilities: Abilities,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawBuildingType {
    turns: u32,
    #[serde(default)]
    sell_value: i32,
    #[serde(default)]
    vision_bonus: i32,
    #[serde(default)]
    walls: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildingType {
    pub name: String,
    pub turns: u32,
    pub sell_value: i32,
    pub vision_bonus: i32,
    pub walls: bool,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub(crate) struct RawTerrainType {
    cost: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct VisionRules {
    pub unit: i32,
    pub settlement: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct CombatRules {
    pub grid_width: i32,
    pub grid_height: i32,
    /// Full rounds after which the defender holds and the attacker falls back.
    pub turn_limit: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RewardRules {
    pub victory_fame: i32,
    pub hero_fame: i32,
    pub raze_fame_penalty: i32,
    pub loot_percent: i32,
    pub hazard_treasure: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawGameRules {
    road_cost: i32,
    flying_cost: i32,
    skilled_cost: i32,
    stack_limit: usize,
    vision: VisionRules,
    combat: CombatRules,
    rewards: RewardRules,
}

#[derive(Clone, Debug)]
pub struct Rules {
    terrain: BTreeMap<TerrainKind, i32>,
    units: BTreeMap<String, UnitType>,
    buildings: BTreeMap<String, BuildingType>,
    pub road_cost: i32,
    pub flying_cost: i32,
    pub skilled_cost: i32,
    pub stack_limit: usize,
    pub vision: VisionRules,
    pub combat: CombatRules,
    pub rewards: RewardRules,
}

impl Rules {
    /// Entry cost of a terrain for a plain walker (or swimmer, on water).
    pub fn terrain_cost(&self, terrain: TerrainKind) -> i32 {
        self.terrain.get(&terrain).copied().unwrap_or(i32::MAX / 4)
    }

    pub fn unit_type(&self, name: &str) -> Option<&UnitType> {
        self.units.get(name)
    }

    pub fn unit_types(&self) -> impl Iterator<Item = &UnitType> {
        self.units.values()
    }

    pub fn building_type(&self, name: &str) -> Option<&BuildingType> {
        self.buildings.get(name)
    }
}
