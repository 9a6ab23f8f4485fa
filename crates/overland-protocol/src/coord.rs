use serde::{Deserialize, Serialize};

/// A cell on the overland map: column, row and plane.
///
/// Planes are parallel grids of identical size, connected only at tower cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub plane: u8,
}

impl Coordinate {
    pub const SURFACE: u8 = 0;
    pub const UNDERWORLD: u8 = 1;

    #[inline]
    pub const fn new(x: i32, y: i32, plane: u8) -> Self {
        Self { x, y, plane }
    }

    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
            plane: self.plane,
        }
    }

    #[inline]
    pub const fn on_plane(self, plane: u8) -> Self {
        Self {
            x: self.x,
            y: self.y,
            plane,
        }
    }

    /// Chebyshev distance on the same plane; `None` across planes.
    pub fn distance(self, other: Coordinate) -> Option<i32> {
        if self.plane != other.plane {
            return None;
        }
        Some((self.x - other.x).abs().max((self.y - other.y).abs()))
    }
}

/// Neighbor enumeration order shared by every grid search.
///
/// Searches visit neighbors in exactly this order, and cost ties are broken in
/// favour of the earlier entry. Plane transitions at towers come after all
/// compass directions, in ascending plane order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    /// Tower transition onto the given plane.
    Plane(u8),
}

impl Direction {
    pub const COMPASS: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    #[inline]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
            Direction::Plane(_) => (0, 0),
        }
    }

    /// Position in the enumeration order (lower wins ties).
    #[inline]
    pub const fn rank(self) -> u16 {
        match self {
            Direction::North => 0,
            Direction::NorthEast => 1,
            Direction::East => 2,
            Direction::SouthEast => 3,
            Direction::South => 4,
            Direction::SouthWest => 5,
            Direction::West => 6,
            Direction::NorthWest => 7,
            Direction::Plane(p) => 8 + p as u16,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
            Direction::Plane(p) => Direction::Plane(p),
        }
    }
}

/// A square on a tactical combat grid. Combat grids are single-plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatPos {
    pub x: i32,
    pub y: i32,
}

impl CombatPos {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    #[inline]
    pub fn distance(self, other: CombatPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}
