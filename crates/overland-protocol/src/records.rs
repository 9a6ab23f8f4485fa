//! Replicated record shapes.
//!
//! These are the shapes a player's memory holds and the shapes carried by
//! update records on the wire. The authoritative world keeps richer state;
//! only the fields below are ever revealed to other players.

use serde::{Deserialize, Serialize};

use crate::{CombatId, Coordinate, EffectId, PlayerId, Urn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    Grassland,
    Forest,
    Hills,
    Mountains,
    Swamp,
    Desert,
    Tundra,
    Shore,
    Ocean,
    Volcano,
}

impl TerrainKind {
    #[inline]
    pub const fn is_water(self) -> bool {
        matches!(self, TerrainKind::Shore | TerrainKind::Ocean)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Lair,
    Node,
    Ruins,
}

/// Static contents of one map cell as a player knows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub coord: Coordinate,
    pub terrain: TerrainKind,
    #[serde(default)]
    pub road: bool,
    #[serde(default)]
    pub tower: bool,
    #[serde(default)]
    pub settlement: Option<Urn>,
    #[serde(default)]
    pub hazard: Option<HazardKind>,
    #[serde(default)]
    pub effects: Vec<EffectId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    Alive,
    Dead,
    /// Created by turn processing but not yet placed on the map.
    Generated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub urn: Urn,
    pub owner: PlayerId,
    pub kind: String,
    pub location: Coordinate,
    pub moves_left: i32,
    pub moves_per_turn: i32,
    pub hit_points: i32,
    pub max_hit_points: i32,
    pub status: UnitStatus,
    #[serde(default)]
    pub hero: bool,
    #[serde(default)]
    pub combat: Option<CombatId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub kind: String,
    pub complete: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub urn: Urn,
    pub owner: PlayerId,
    pub name: String,
    pub location: Coordinate,
    pub population: u8,
    #[serde(default)]
    pub buildings: Vec<BuildingRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EffectKind {
    /// Grants the caster vision of every cell within `radius` of the anchor.
    TrueSight { radius: i32 },
    Ward,
    Curse,
    Other { name: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EffectTarget {
    None,
    Unit { urn: Urn },
    Settlement { urn: Urn },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub id: EffectId,
    pub caster: PlayerId,
    pub kind: EffectKind,
    pub target: EffectTarget,
    pub anchor: Coordinate,
    pub upkeep: i32,
}

/// Public attributes of a player, known to everyone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPublic {
    pub id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    #[serde(default)]
    pub fame: i32,
    #[serde(default)]
    pub gold: i32,
    #[serde(default = "default_true")]
    pub alive: bool,
}

fn default_true() -> bool {
    true
}
