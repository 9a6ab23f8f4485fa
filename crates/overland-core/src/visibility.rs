//! Which cells a player currently sees. A pure function of the world.

use std::collections::BTreeSet;

use overland_protocol::{Coordinate, EffectKind, PlayerId};

use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisionSource {
    pub center: Coordinate,
    pub radius: i32,
    /// Towers see onto every plane.
    pub all_planes: bool,
}

pub fn vision_sources(world: &World, player: PlayerId) -> Vec<VisionSource> {
    let map = world.map();
    let mut sources = Vec::new();

    for (_, unit) in world.units() {
        if unit.owner != player || !unit.is_on_map() {
            continue;
        }
        sources.push(VisionSource {
            center: unit.location,
            radius: unit.vision.max(0),
            all_planes: map.has_tower(unit.location),
        });
    }

    for (_, settlement) in world.settlements() {
        if settlement.owner != player {
            continue;
        }
        sources.push(VisionSource {
            center: settlement.location,
            radius: settlement.vision_radius(world.rules()),
            all_planes: map.has_tower(settlement.location),
        });
    }

    for (_, effect) in world.effects() {
        if effect.caster != player {
            continue;
        }
        if let EffectKind::TrueSight { radius } = effect.kind {
            sources.push(VisionSource {
                center: effect.anchor,
                radius: radius.max(0),
                all_planes: false,
            });
        }
    }

    sources
}

pub fn visible_cells(world: &World, player: PlayerId) -> BTreeSet<Coordinate> {
    let shape = world.shape();
    let mut visible = BTreeSet::new();
    for source in vision_sources(world, player) {
        let planes = if source.all_planes {
            0..shape.planes
        } else {
            source.center.plane..source.center.plane + 1
        };
        for plane in planes {
            visible.extend(shape.coords_in_radius(source.center.on_plane(plane), source.radius));
        }
    }
    visible
}

pub fn can_see(world: &World, player: PlayerId, coord: Coordinate) -> bool {
    let shape = world.shape();
    let Some(coord) = shape.normalize(coord) else {
        return false;
    };
    vision_sources(world, player).into_iter().any(|source| {
        let center = if source.all_planes {
            source.center.on_plane(coord.plane)
        } else {
            source.center
        };
        shape
            .distance(center, coord)
            .is_some_and(|d| d <= source.radius)
    })
}
