use overland_protocol::{CombatPos, Direction, TerrainKind, Urn};

use crate::combat::{Combat, Combatant, SideKind};
use crate::movement::SearchSpace;
use crate::rules::CombatRules;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombatTerrain {
    Open,
    Rough,
    Wall,
}

/// Tactical battlefield. Defenders deploy along the top rows, attackers along the bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombatGrid {
    width: i32,
    height: i32,
    squares: Vec<CombatTerrain>,
}

impl CombatGrid {
    pub fn generate(rules: &CombatRules, terrain: TerrainKind, walls: bool) -> Self {
        let width = rules.grid_width.max(3);
        let height = rules.grid_height.max(5);
        let rough = matches!(
            terrain,
            TerrainKind::Forest
                | TerrainKind::Hills
                | TerrainKind::Mountains
                | TerrainKind::Swamp
                | TerrainKind::Volcano
        );
        let mut squares = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let deploy = y < 2 || y >= height - 2;
                let square = if walls && y == 2 && x != width / 2 {
                    CombatTerrain::Wall
                } else if rough && !deploy && (x * 7 + y * 3) % 5 == 0 {
                    CombatTerrain::Rough
                } else {
                    CombatTerrain::Open
                };
                squares.push(square);
            }
        }
        Self {
            width,
            height,
            squares,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, pos: CombatPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn index_of(&self, pos: CombatPos) -> Option<usize> {
        self.contains(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn pos_at(&self, index: usize) -> Option<CombatPos> {
        (index < self.squares.len()).then(|| {
            CombatPos::new(index as i32 % self.width, index as i32 / self.width)
        })
    }

    pub fn terrain(&self, pos: CombatPos) -> Option<CombatTerrain> {
        self.index_of(pos).map(|i| self.squares[i])
    }

    /// Starting squares for `count` units: front row first, centre outwards.
    pub fn deployment(&self, side: SideKind, count: usize) -> Vec<CombatPos> {
        let rows = match side {
            SideKind::Defender => [1, 0],
            SideKind::Attacker => [self.height - 2, self.height - 1],
        };
        let centre = self.width / 2;
        let mut columns = vec![centre];
        for offset in 1..=self.width {
            for x in [centre + offset, centre - offset] {
                if (0..self.width).contains(&x) {
                    columns.push(x);
                }
            }
        }
        rows.into_iter()
            .flat_map(|y| columns.iter().map(move |x| CombatPos::new(*x, y)))
            .take(count)
            .collect()
    }
}

/// The combat grid as a search space for one combatant.
pub struct CombatSpace<'a> {
    combat: &'a Combat,
    grid: &'a CombatGrid,
    mover: &'a Combatant,
}

impl<'a> CombatSpace<'a> {
    pub fn new(combat: &'a Combat, unit: Urn) -> Option<Self> {
        Some(Self {
            grid: combat.grid()?,
            mover: combat.combatant(unit)?,
            combat,
        })
    }

    fn occupant(&self, pos: CombatPos) -> Option<&Combatant> {
        self.combat
            .combatants()
            .find(|c| c.alive && c.pos == pos && c.urn != self.mover.urn)
    }
}

impl SearchSpace for CombatSpace<'_> {
    type Node = CombatPos;

    fn len(&self) -> usize {
        (self.grid.width * self.grid.height) as usize
    }

    fn index_of(&self, node: CombatPos) -> Option<usize> {
        self.grid.index_of(node)
    }

    fn node_at(&self, index: usize) -> Option<CombatPos> {
        self.grid.pos_at(index)
    }

    fn neighbors(&self, node: CombatPos, out: &mut Vec<(Direction, CombatPos)>) {
        out.clear();
        for direction in Direction::COMPASS {
            let next = node.step(direction);
            if self.grid.contains(next) {
                out.push((direction, next));
            }
        }
    }

    fn enter_cost(&self, _from: CombatPos, to: CombatPos) -> Option<i32> {
        if self
            .occupant(to)
            .is_some_and(|c| c.side == self.mover.side)
        {
            return None;
        }
        match (self.grid.terrain(to)?, self.mover.flying) {
            (_, true) => Some(2),
            (CombatTerrain::Open, false) => Some(2),
            (CombatTerrain::Rough, false) => Some(4),
            (CombatTerrain::Wall, false) => None,
        }
    }

    fn triggers_encounter(&self, node: CombatPos) -> bool {
        self.occupant(node).is_some_and(|c| c.side != self.mover.side)
    }
}
