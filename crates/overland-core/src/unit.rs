use overland_protocol::{CombatId, CombatPos, Coordinate, PlayerId, UnitRecord, UnitStatus, Urn};
use serde::{Deserialize, Serialize};

use crate::rules::{Abilities, UnitType};

/// Where a unit stands on the grid of the one combat it is enrolled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSlot {
    pub combat: CombatId,
    pub pos: CombatPos,
}

#[derive(Clone, Debug)]
pub struct Unit {
    pub kind: String,
    pub owner: PlayerId,
    pub location: Coordinate,
    /// Doubled movement units left this turn.
    pub moves_left: i32,
    pub moves_per_turn: i32,
    pub hit_points: i32,
    pub max_hit_points: i32,
    pub attack: i32,
    pub defense: i32,
    pub vision: i32,
    pub hero: bool,
    pub abilities: Abilities,
    pub status: UnitStatus,
    pub combat: Option<CombatSlot>,
}

impl Unit {
    pub fn from_type(utype: &UnitType, owner: PlayerId, location: Coordinate) -> Self {
        Self {
            kind: utype.name.clone(),
            owner,
            location,
            moves_left: utype.moves,
            moves_per_turn: utype.moves,
            hit_points: utype.hit_points,
            max_hit_points: utype.hit_points,
            attack: utype.attack,
            defense: utype.defense,
            vision: utype.vision,
            hero: utype.hero,
            abilities: utype.abilities,
            status: UnitStatus::Alive,
            combat: None,
        }
    }

    /// Alive and standing on the map (not waiting to be placed).
    #[inline]
    pub fn is_on_map(&self) -> bool {
        self.status == UnitStatus::Alive
    }

    pub fn record(&self, urn: Urn) -> UnitRecord {
        UnitRecord {
            urn,
            owner: self.owner,
            kind: self.kind.clone(),
            location: self.location,
            moves_left: self.moves_left,
            moves_per_turn: self.moves_per_turn,
            hit_points: self.hit_points,
            max_hit_points: self.max_hit_points,
            status: self.status,
            hero: self.hero,
            combat: self.combat.map(|slot| slot.combat),
        }
    }
}
