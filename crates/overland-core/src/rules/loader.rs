use std::collections::BTreeMap;

use overland_protocol::TerrainKind;
use serde::Deserialize;
use thiserror::Error;

use crate::rules::{
    BuildingType, RawBuildingType, RawGameRules, RawTerrainType, RawUnitType, Rules, UnitType,
};

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("terrain '{0:?}' has no cost entry")]
    MissingTerrain(TerrainKind),
    #[error("invalid value for {field}: {value}")]
    Invalid { field: String, value: i64 },
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub enum RulesSource<'a> {
    Embedded,
    /// Directory holding `terrain.yaml`, `units.yaml`, `buildings.yaml` and `game.yaml`.
    Path(String),
    Bytes {
        terrain: &'a [u8],
        units: &'a [u8],
        buildings: &'a [u8],
        game: &'a [u8],
    },
}

#[derive(Debug, Deserialize)]
struct RawRules {
    terrain: BTreeMap<TerrainKind, RawTerrainType>,
    units: BTreeMap<String, RawUnitType>,
    buildings: BTreeMap<String, RawBuildingType>,
    game: RawGameRules,
}

pub fn load_rules(source: RulesSource<'_>) -> Result<Rules, RulesError> {
    let raw = match source {
        RulesSource::Embedded => parse_raw_rules(
            include_str!("../../data/base/terrain.yaml"),
            include_str!("../../data/base/units.yaml"),
            include_str!("../../data/base/buildings.yaml"),
            include_str!("../../data/base/game.yaml"),
        )?,
        RulesSource::Path(path) => {
            let terrain = std::fs::read_to_string(format!("{path}/terrain.yaml"))?;
            let units = std::fs::read_to_string(format!("{path}/units.yaml"))?;
            let buildings = std::fs::read_to_string(format!("{path}/buildings.yaml"))?;
            let game = std::fs::read_to_string(format!("{path}/game.yaml"))?;
            parse_raw_rules(&terrain, &units, &buildings, &game)?
        }
        RulesSource::Bytes {
            terrain,
            units,
            buildings,
            game,
        } => parse_raw_rules(
            std::str::from_utf8(terrain)?,
            std::str::from_utf8(units)?,
            std::str::from_utf8(buildings)?,
            std::str::from_utf8(game)?,
        )?,
    };
    compile(raw)
}

fn parse_raw_rules(
    terrain: &str,
    units: &str,
    buildings: &str,
    game: &str,
) -> Result<RawRules, RulesError> {
    Ok(RawRules {
        terrain: serde_yaml::from_str(terrain)?,
        units: serde_yaml::from_str(units)?,
        buildings: serde_yaml::from_str(buildings)?,
        game: serde_yaml::from_str(game)?,
    })
}

fn positive(field: &str, value: i32) -> Result<i32, RulesError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(RulesError::Invalid {
            field: field.to_string(),
            value: i64::from(value),
        })
    }
}

fn compile(raw: RawRules) -> Result<Rules, RulesError> {
    let mut terrain = BTreeMap::new();
    for kind in [
        TerrainKind::Grassland,
        TerrainKind::Forest,
        TerrainKind::Hills,
        TerrainKind::Mountains,
        TerrainKind::Swamp,
        TerrainKind::Desert,
        TerrainKind::Tundra,
        TerrainKind::Shore,
        TerrainKind::Ocean,
        TerrainKind::Volcano,
    ] {
        let entry = raw.terrain.get(&kind).ok_or(RulesError::MissingTerrain(kind))?;
        terrain.insert(kind, positive(&format!("terrain.{kind:?}.cost"), entry.cost)?);
    }

    let game = raw.game;
    let mut units = BTreeMap::new();
    for (name, unit) in raw.units {
        if unit.moves < 0 {
            return Err(RulesError::Invalid {
                field: format!("units.{name}.moves"),
                value: i64::from(unit.moves),
            });
        }
        positive(&format!("units.{name}.hit_points"), unit.hit_points)?;
        units.insert(
            name.clone(),
            UnitType {
                name,
                moves: unit.moves,
                hit_points: unit.hit_points,
                attack: unit.attack,
                defense: unit.defense,
                vision: unit.vision.unwrap_or(game.vision.unit),
                hero: unit.hero,
                abilities: unit.abilities,
            },
        );
    }

    let buildings = raw
        .buildings
        .into_iter()
        .map(|(name, b)| {
            let building = BuildingType {
                name: name.clone(),
                turns: b.turns,
                sell_value: b.sell_value,
                vision_bonus: b.vision_bonus,
                walls: b.walls,
            };
            (name, building)
        })
        .collect();

    positive("combat.grid_width", game.combat.grid_width)?;
    positive("combat.grid_height", game.combat.grid_height)?;
    if game.stack_limit == 0 {
        return Err(RulesError::Invalid {
            field: "stack_limit".to_string(),
            value: 0,
        });
    }
    // Each side deploys on its own two rows; a full stack must fit there.
    if game.combat.grid_height < 4 {
        return Err(RulesError::Invalid {
            field: "combat.grid_height".to_string(),
            value: i64::from(game.combat.grid_height),
        });
    }
    let deployable = 2 * i64::from(game.combat.grid_width);
    if deployable < game.stack_limit as i64 {
        return Err(RulesError::Invalid {
            field: "combat.grid_width".to_string(),
            value: i64::from(game.combat.grid_width),
        });
    }

    Ok(Rules {
        terrain,
        units,
        buildings,
        road_cost: positive("road_cost", game.road_cost)?,
        flying_cost: positive("flying_cost", game.flying_cost)?,
        skilled_cost: positive("skilled_cost", game.skilled_cost)?,
        stack_limit: game.stack_limit,
        vision: game.vision,
        combat: game.combat,
        rewards: game.rewards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERRAIN: &str = "grassland: { cost: 2 }\n";

    #[test]
    fn missing_terrain_is_rejected() {
        let err = load_rules(RulesSource::Bytes {
            terrain: TERRAIN.as_bytes(),
            units: b"{}",
            buildings: b"{}",
            game: include_bytes!("../../data/base/game.yaml"),
        })
        .expect_err("incomplete terrain table");
        assert!(matches!(err, RulesError::MissingTerrain(_)));
    }

    #[test]
    fn grid_too_narrow_for_a_full_stack_is_rejected() {
        let game = include_str!("../../data/base/game.yaml").replace("grid_width: 11", "grid_width: 3");
        let err = load_rules(RulesSource::Bytes {
            terrain: include_bytes!("../../data/base/terrain.yaml"),
            units: include_bytes!("../../data/base/units.yaml"),
            buildings: include_bytes!("../../data/base/buildings.yaml"),
            game: game.as_bytes(),
        })
        .expect_err("six squares cannot hold nine units");
        assert!(matches!(
            err,
            RulesError::Invalid { ref field, value: 3 } if field == "combat.grid_width"
        ));
    }

    #[test]
    fn bad_yaml_reports_parse_error() {
        let err = load_rules(RulesSource::Bytes {
            terrain: b"grassland: [",
            units: b"{}",
            buildings: b"{}",
            game: b"{}",
        })
        .expect_err("malformed yaml");
        assert!(matches!(err, RulesError::Yaml(_)));
    }
}
