//! Combat lifecycle: scheduling, the two-party handshake, turn-by-turn
//! fighting on a tactical grid and resolution back into the world.

mod auto;
mod damage;
mod grid;
mod orchestrator;
mod phase;
mod resolution;

use std::collections::{BTreeMap, BTreeSet};

use overland_protocol::{CombatId, CombatPos, CombatSummary, Coordinate, PlayerId, Urn};

pub use auto::{plan_turn, AutoTurnJob};
pub use damage::{DamageResolver, FlatDamage, StrikeOutcome};
pub use grid::{CombatGrid, CombatSpace, CombatTerrain};
pub use orchestrator::CombatOrchestrator;
pub use phase::{CombatPhase, PhaseEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SideKind {
    Attacker,
    Defender,
}

impl SideKind {
    pub fn other(self) -> Self {
        match self {
            SideKind::Attacker => SideKind::Defender,
            SideKind::Defender => SideKind::Attacker,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Side {
    /// [`PlayerId::NEUTRAL`] for hazard guardians.
    pub player: PlayerId,
    pub ai: bool,
    /// Turns computed by the auto-control policy.
    pub auto: bool,
    /// Units committed when the combat was scheduled.
    pub roster: Vec<Urn>,
}

impl Side {
    /// Decisions for this side never wait on a human.
    pub fn is_automatic(&self) -> bool {
        self.ai || self.auto
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Combatant {
    pub urn: Urn,
    pub side: SideKind,
    pub pos: CombatPos,
    pub hit_points: i32,
    pub max_hit_points: i32,
    pub attack: i32,
    pub defense: i32,
    pub moves_left: i32,
    pub moves_per_turn: i32,
    pub flying: bool,
    pub hero: bool,
    pub acted: bool,
    pub alive: bool,
}

impl Combatant {
    /// Still able to do something this turn.
    pub fn can_act(&self) -> bool {
        self.alive && !self.acted && self.moves_left > 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    Eliminated,
    Retreat,
    TurnLimit,
}

#[derive(Clone, Debug)]
pub struct Combat {
    pub id: CombatId,
    phase: CombatPhase,
    pub from: Coordinate,
    pub at: Coordinate,
    pub attacker: Side,
    pub defender: Side,
    pub settlement: Option<Urn>,
    pub hazard: bool,
    grid: Option<CombatGrid>,
    combatants: BTreeMap<Urn, Combatant>,
    ready: BTreeSet<PlayerId>,
    held_on: Option<PlayerId>,
    turn: u32,
    current: SideKind,
    revision: u64,
    winner: Option<SideKind>,
    end: Option<EndReason>,
    summary: CombatSummary,
}

impl Combat {
    pub fn phase(&self) -> CombatPhase {
        self.phase
    }

    pub fn grid(&self) -> Option<&CombatGrid> {
        self.grid.as_ref()
    }

    pub fn combatant(&self, urn: Urn) -> Option<&Combatant> {
        self.combatants.get(&urn)
    }

    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.values()
    }

    pub fn alive_on(&self, side: SideKind) -> impl Iterator<Item = &Combatant> {
        self.combatants
            .values()
            .filter(move |c| c.alive && c.side == side)
    }

    pub fn side(&self, kind: SideKind) -> &Side {
        match kind {
            SideKind::Attacker => &self.attacker,
            SideKind::Defender => &self.defender,
        }
    }

    fn side_mut(&mut self, kind: SideKind) -> &mut Side {
        match kind {
            SideKind::Attacker => &mut self.attacker,
            SideKind::Defender => &mut self.defender,
        }
    }

    /// Which side `player` fights on, if any.
    pub fn side_of(&self, player: PlayerId) -> Option<SideKind> {
        if self.attacker.player == player {
            Some(SideKind::Attacker)
        } else if self.defender.player == player {
            Some(SideKind::Defender)
        } else {
            None
        }
    }

    /// Players seated at the table (neutral guardians excluded).
    pub fn players(&self) -> impl Iterator<Item = PlayerId> {
        [self.attacker.player, self.defender.player]
            .into_iter()
            .filter(|p| !p.is_neutral())
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn current(&self) -> SideKind {
        self.current
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn held_on(&self) -> Option<PlayerId> {
        self.held_on
    }

    pub fn is_ready(&self, player: PlayerId) -> bool {
        self.ready.contains(&player)
    }

    pub fn winner(&self) -> Option<SideKind> {
        self.winner
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end
    }

    /// Outcome so far: casualties once resolving, everything once closed.
    pub fn summary(&self) -> &CombatSummary {
        &self.summary
    }

    /// Enemy combatants standing next to `pos`.
    pub fn adjacent_enemies(&self, side: SideKind, pos: CombatPos) -> Vec<&Combatant> {
        self.alive_on(side.other())
            .filter(|c| c.pos.distance(pos) == 1)
            .collect()
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
