use overland_protocol::{CombatId, Coordinate, PlayerId, RejectionKind, Urn};
use thiserror::Error;

use crate::combat::{CombatPhase, PhaseEvent};

/// The intent contradicts authoritative state. Reported to the requester only; nothing changed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown unit {0}")]
    UnknownUnit(Urn),
    #[error("unit {0} does not belong to the requesting player")]
    NotYourUnit(Urn),
    #[error("unit {0} is not alive on the map")]
    UnitNotAlive(Urn),
    #[error("unit {0} is fighting")]
    UnitInCombat(Urn),
    #[error("no units given")]
    EmptyStack,
    #[error("units must share one cell to move as a stack")]
    StackNotTogether,
    #[error("destination {0:?} is not reachable this turn")]
    Unreachable(Coordinate),
    #[error("destination {0:?} is the current location")]
    AlreadyThere(Coordinate),
    #[error("stack would exceed {limit} units at {at:?}")]
    StackLimit { at: Coordinate, limit: usize },
    #[error("unknown settlement {0}")]
    UnknownSettlement(Urn),
    #[error("settlement {0} does not belong to the requesting player")]
    NotYourSettlement(Urn),
    #[error("settlement has no completed building '{0}'")]
    UnknownBuilding(String),
    #[error("unknown unit type '{0}'")]
    UnknownUnitType(String),
    #[error("coordinate {0:?} is off the map")]
    OffMap(Coordinate),
    #[error("nothing at {0:?} to fight")]
    NothingToFight(Coordinate),
    #[error("unknown combat {0}")]
    UnknownCombat(CombatId),
    #[error("combat {0} is already over")]
    CombatOver(CombatId),
    #[error("player is not a side in this combat")]
    NotAParticipant,
    #[error("combat is {phase:?}; {action} is not allowed")]
    WrongPhase {
        phase: CombatPhase,
        action: &'static str,
    },
    #[error("this side already asked to fight")]
    AlreadyRequested,
    #[error("only the attacker may withdraw a scheduled combat")]
    NotTheAttacker,
    #[error("it is not this side's turn")]
    NotYourTurn,
    #[error("unit {0} already acted this turn")]
    AlreadyActed(Urn),
    #[error("unit {0} is not a combatant here")]
    NotACombatant(Urn),
    #[error("target {0} is not an adjacent enemy")]
    InvalidTarget(Urn),
    #[error("combat square is not reachable with the unit's remaining movement")]
    CombatMoveUnreachable,
    #[error("{0} unit(s) have not acted or passed")]
    UnitsStillToAct(usize),
    #[error("side is not under auto-control")]
    NotAutoControlled,
    #[error("no capture decision is pending")]
    NoDecisionPending,
    #[error("turn already ended")]
    TurnAlreadyEnded,
    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),
}

/// The other party is not available right now. Retryable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoordinationError {
    #[error("player {0:?} is already fighting combat {1}")]
    AlreadyFighting(PlayerId, CombatId),
    #[error("orders were planned against revision {planned} but combat is at {current}")]
    StaleDecision { planned: u64, current: u64 },
    #[error("combat {0} is waiting on a capture decision")]
    DecisionPending(CombatId),
}

/// A broken internal invariant. Never user-facing; the operation is aborted.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("reference to {0} resolves to nothing and is not tombstoned")]
    DanglingUrn(Urn),
    #[error("memory of player {player:?} disagrees with the world at visible {coord:?}")]
    MemoryMismatch { player: PlayerId, coord: Coordinate },
    #[error("combat position of {urn} disagrees with enrollment in {combat:?}")]
    CombatEnrollment { urn: Urn, combat: Option<CombatId> },
    #[error("settlement {urn} vanished during combat {combat}")]
    SettlementVanished { combat: CombatId, urn: Urn },
    #[error("illegal combat transition from {from:?} on {event:?}")]
    IllegalTransition { from: CombatPhase, event: PhaseEvent },
    #[error("intent routed to the {0} handler does not match it")]
    MisroutedIntent(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

impl CoreError {
    pub fn rejection_kind(&self) -> RejectionKind {
        match self {
            CoreError::Coordination(_) => RejectionKind::TryAgain,
            CoreError::Validation(_) | CoreError::Consistency(_) => RejectionKind::Validation,
        }
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, CoreError::Consistency(_))
    }
}
