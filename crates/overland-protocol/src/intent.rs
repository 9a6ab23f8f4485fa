use serde::{Deserialize, Serialize};

use crate::{CombatId, CombatPos, Coordinate, IntentId, PlayerId, Urn};

/// A player's request to change the world. Every intent is applied at most once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub player: PlayerId,
    pub kind: IntentKind,
}

/// All possible client→sim intents. Fully serializable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntentKind {
    // Overland
    MoveStack { units: Vec<Urn>, to: Coordinate },
    DismissUnit { unit: Urn },
    SellBuilding { settlement: Urn, building: String },
    EndTurn,

    // Combat handshake
    RequestCombat { combat: CombatId },
    WithdrawCombat { combat: CombatId },

    // Active combat
    MoveCombatUnit { combat: CombatId, unit: Urn, to: CombatPos },
    AttackCombatUnit { combat: CombatId, attacker: Urn, target: Urn },
    PassCombatUnit { combat: CombatId, unit: Urn },
    EndCombatTurn { combat: CombatId },
    SetAutoControl { combat: CombatId, enabled: bool },
    RetreatCombat { combat: CombatId },
    /// Orders computed by the auto-control policy against `revision`.
    AutoCombatOrders {
        combat: CombatId,
        revision: u64,
        orders: Vec<CombatOrder>,
    },

    // Post-combat
    DecideCapture { combat: CombatId, decision: CaptureDecision },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CombatOrder {
    Move { unit: Urn, to: CombatPos },
    Attack { unit: Urn, target: Urn },
    Pass { unit: Urn },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureDecision {
    Capture,
    Raze,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    /// The intent contradicts current state; resubmitting it unchanged will fail again.
    Validation,
    /// The other party is not available right now; the same intent may succeed later.
    TryAgain,
}

/// Rejection delivered only to the player that submitted the intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub intent: IntentId,
    pub kind: RejectionKind,
    pub reason: String,
}
