use overland_protocol::{BuildingRecord, Coordinate, PlayerId, SettlementRecord, Urn};

use crate::rules::Rules;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Building {
    pub kind: String,
    /// Turns of work left; zero once complete.
    pub turns_left: u32,
}

impl Building {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.turns_left == 0
    }
}

#[derive(Clone, Debug)]
pub struct Settlement {
    pub name: String,
    pub owner: PlayerId,
    pub location: Coordinate,
    pub population: u8,
    pub buildings: Vec<Building>,
    pub gold: i32,
}

impl Settlement {
    pub fn new(name: impl Into<String>, owner: PlayerId, location: Coordinate) -> Self {
        Self {
            name: name.into(),
            owner,
            location,
            population: 1,
            buildings: Vec::new(),
            gold: 0,
        }
    }

    pub fn completed(&self) -> impl Iterator<Item = &Building> {
        self.buildings.iter().filter(|b| b.is_complete())
    }

    pub fn has_completed(&self, kind: &str) -> bool {
        self.completed().any(|b| b.kind == kind)
    }

    pub fn vision_radius(&self, rules: &Rules) -> i32 {
        let bonus: i32 = self
            .completed()
            .filter_map(|b| rules.building_type(&b.kind))
            .map(|t| t.vision_bonus)
            .sum();
        rules.vision.settlement + bonus
    }

    pub fn has_walls(&self, rules: &Rules) -> bool {
        self.completed()
            .filter_map(|b| rules.building_type(&b.kind))
            .any(|t| t.walls)
    }

    pub fn record(&self, urn: Urn) -> SettlementRecord {
        SettlementRecord {
            urn,
            owner: self.owner,
            name: self.name.clone(),
            location: self.location,
            population: self.population,
            buildings: self
                .buildings
                .iter()
                .map(|b| BuildingRecord {
                    kind: b.kind.clone(),
                    complete: b.is_complete(),
                })
                .collect(),
        }
    }
}
