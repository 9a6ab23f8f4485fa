use std::collections::VecDeque;

use overland_protocol::{CellRecord, Coordinate, Direction, EffectId, HazardKind, TerrainKind, Urn};
use serde::{Deserialize, Serialize};

/// Dimensions of the overland map, known to every player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapShape {
    pub width: u32,
    pub height: u32,
    pub planes: u8,
    pub wrap_horizontal: bool,
}

impl MapShape {
    pub fn new(width: u32, height: u32, planes: u8, wrap_horizontal: bool) -> Self {
        Self {
            width,
            height,
            planes: planes.max(1),
            wrap_horizontal,
        }
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.plane_len() * self.planes as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wraps `x` on wrapping maps; `None` when the coordinate is off the map.
    pub fn normalize(&self, coord: Coordinate) -> Option<Coordinate> {
        if coord.plane >= self.planes || coord.y < 0 || coord.y >= self.height as i32 {
            return None;
        }
        let x = if self.wrap_horizontal {
            coord.x.rem_euclid(self.width as i32)
        } else if coord.x >= 0 && coord.x < self.width as i32 {
            coord.x
        } else {
            return None;
        };
        Some(Coordinate::new(x, coord.y, coord.plane))
    }

    pub fn contains(&self, coord: Coordinate) -> bool {
        self.normalize(coord) == Some(coord)
    }

    pub fn index_of(&self, coord: Coordinate) -> Option<usize> {
        let c = self.normalize(coord)?;
        Some(c.plane as usize * self.plane_len() + c.y as usize * self.width as usize + c.x as usize)
    }

    pub fn coordinate_at(&self, index: usize) -> Option<Coordinate> {
        if index >= self.len() || self.width == 0 {
            return None;
        }
        let plane = index / self.plane_len();
        let rest = index % self.plane_len();
        Some(Coordinate::new(
            (rest % self.width as usize) as i32,
            (rest / self.width as usize) as i32,
            plane as u8,
        ))
    }

    /// Neighbor in a compass direction, respecting wrap. Plane steps are not handled here.
    pub fn step(&self, coord: Coordinate, direction: Direction) -> Option<Coordinate> {
        match direction {
            Direction::Plane(_) => None,
            _ => self.normalize(coord.step(direction)),
        }
    }

    /// Chebyshev distance on one plane, taking horizontal wrap into account.
    pub fn distance(&self, a: Coordinate, b: Coordinate) -> Option<i32> {
        if a.plane != b.plane {
            return None;
        }
        let mut dx = (a.x - b.x).abs();
        if self.wrap_horizontal {
            dx = dx.min(self.width as i32 - dx);
        }
        Some(dx.max((a.y - b.y).abs()))
    }

    /// Cells within `radius` steps of `center` on its plane (inclusive), in stable index order.
    pub fn coords_in_radius(&self, center: Coordinate, radius: i32) -> Vec<Coordinate> {
        let Some(start) = self.index_of(center) else {
            return Vec::new();
        };
        let radius = radius.max(0);

        let mut dist = vec![i32::MAX; self.len()];
        dist[start] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(index) = queue.pop_front() {
            let d = dist[index];
            if d >= radius {
                continue;
            }
            let Some(here) = self.coordinate_at(index) else {
                continue;
            };
            for direction in Direction::COMPASS {
                let Some(next) = self.step(here, direction).and_then(|c| self.index_of(c)) else {
                    continue;
                };
                if dist[next] <= d + 1 {
                    continue;
                }
                dist[next] = d + 1;
                queue.push_back(next);
            }
        }

        dist.into_iter()
            .enumerate()
            .filter(|(_, d)| *d <= radius)
            .filter_map(|(index, _)| self.coordinate_at(index))
            .collect()
    }
}

/// A stationary guardian encounter: a lair, node or ruin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub kind: HazardKind,
    /// Neutral units defending the site.
    pub guardians: Vec<Urn>,
    /// Generated units held here, freed to whoever clears the site.
    #[serde(default)]
    pub captives: Vec<Urn>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    pub terrain: TerrainKind,
    pub road: bool,
    pub tower: bool,
    pub settlement: Option<Urn>,
    pub hazard: Option<Hazard>,
    pub effects: Vec<EffectId>,
}

impl Cell {
    fn plain(terrain: TerrainKind) -> Self {
        Self {
            terrain,
            road: false,
            tower: false,
            settlement: None,
            hazard: None,
            effects: Vec::new(),
        }
    }

    pub fn record(&self, coord: Coordinate) -> CellRecord {
        CellRecord {
            coord,
            terrain: self.terrain,
            road: self.road,
            tower: self.tower,
            settlement: self.settlement,
            hazard: self.hazard.as_ref().map(|h| h.kind),
            effects: self.effects.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OverlandMap {
    shape: MapShape,
    cells: Vec<Cell>,
}

impl OverlandMap {
    pub fn new(shape: MapShape, default_terrain: TerrainKind) -> Self {
        Self {
            shape,
            cells: vec![Cell::plain(default_terrain); shape.len()],
        }
    }

    pub fn shape(&self) -> MapShape {
        self.shape
    }

    pub fn get(&self, coord: Coordinate) -> Option<&Cell> {
        self.cells.get(self.shape.index_of(coord)?)
    }

    pub(crate) fn get_mut(&mut self, coord: Coordinate) -> Option<&mut Cell> {
        let index = self.shape.index_of(coord)?;
        self.cells.get_mut(index)
    }

    pub fn cells(&self) -> impl Iterator<Item = (Coordinate, &Cell)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| Some((self.shape.coordinate_at(i)?, cell)))
    }

    pub fn record(&self, coord: Coordinate) -> Option<CellRecord> {
        let coord = self.shape.normalize(coord)?;
        Some(self.get(coord)?.record(coord))
    }

    pub fn terrain(&self, coord: Coordinate) -> Option<TerrainKind> {
        self.get(coord).map(|c| c.terrain)
    }

    pub fn has_tower(&self, coord: Coordinate) -> bool {
        self.get(coord).is_some_and(|c| c.tower)
    }

    // Map authoring. Only used before a world goes live.

    pub fn set_terrain(&mut self, coord: Coordinate, terrain: TerrainKind) {
        if let Some(cell) = self.get_mut(coord) {
            cell.terrain = terrain;
        }
    }

    pub fn set_road(&mut self, coord: Coordinate, road: bool) {
        if let Some(cell) = self.get_mut(coord) {
            cell.road = road;
        }
    }

    /// Towers stand at the same (x, y) on every plane.
    pub fn set_tower(&mut self, x: i32, y: i32) {
        for plane in 0..self.shape.planes {
            if let Some(cell) = self.get_mut(Coordinate::new(x, y, plane)) {
                cell.tower = true;
            }
        }
    }
}

/// Neighbors of `coord` in the fixed enumeration order: compass directions,
/// then (on tower cells) every other plane in ascending order.
pub fn neighbors(
    shape: &MapShape,
    coord: Coordinate,
    tower: bool,
    out: &mut Vec<(Direction, Coordinate)>,
) {
    out.clear();
    for direction in Direction::COMPASS {
        if let Some(next) = shape.step(coord, direction) {
            out.push((direction, next));
        }
    }
    if tower {
        for plane in 0..shape.planes {
            if plane != coord.plane {
                out.push((Direction::Plane(plane), coord.on_plane(plane)));
            }
        }
    }
}
