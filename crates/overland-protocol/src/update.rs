use serde::{Deserialize, Serialize};

use crate::{
    CellRecord, CombatId, CombatPos, Coordinate, EffectId, EffectRecord, PlayerId, PlayerPublic,
    SettlementRecord, Urn, UnitRecord, UnitStatus,
};

/// All server→client replication records. Fully serializable.
///
/// The first group mutates the receiving player's memory; the combat group
/// carries encounter notices to the players taking part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpdateRecord {
    // Turn flow
    TurnStarted {
        turn: u32,
    },

    // Cells
    CellRevealed {
        cell: CellRecord,
        turn: u32,
    },
    CellPatched {
        cell: CellRecord,
    },
    CellHidden {
        coord: Coordinate,
    },

    // Units
    UnitUpserted {
        unit: UnitRecord,
    },
    UnitMoved {
        urn: Urn,
        from: Coordinate,
        to: Coordinate,
        moves_left: i32,
    },
    UnitPatched {
        urn: Urn,
        hit_points: i32,
        moves_left: i32,
        status: UnitStatus,
        #[serde(default)]
        combat: Option<CombatId>,
    },
    /// A remembered unit walked out of sight; it is no longer where it was.
    UnitLeftView {
        urn: Urn,
        last_seen: Coordinate,
    },
    UnitRemoved {
        urn: Urn,
        at: Coordinate,
        reason: RemovalReason,
    },

    // Settlements
    SettlementUpserted {
        settlement: SettlementRecord,
    },
    SettlementOwnerChanged {
        urn: Urn,
        owner: PlayerId,
    },
    SettlementPatched {
        settlement: SettlementRecord,
    },
    SettlementRemoved {
        urn: Urn,
        at: Coordinate,
    },

    // Effects
    EffectAdded {
        effect: EffectRecord,
    },
    EffectRemoved {
        id: EffectId,
        at: Coordinate,
    },

    // Players
    PlayerUpdated {
        player: PlayerPublic,
    },

    // Combat notices
    CombatScheduled {
        combat: CombatId,
        attacker: PlayerId,
        defender: Option<PlayerId>,
        from: Coordinate,
        at: Coordinate,
    },
    CombatRequested {
        combat: CombatId,
        by: PlayerId,
    },
    /// The request is parked until `waiting_on` finishes another fight.
    CombatHeld {
        combat: CombatId,
        waiting_on: PlayerId,
    },
    CombatActivated {
        combat: CombatId,
        first: PlayerId,
    },
    CombatTurn {
        combat: CombatId,
        side: PlayerId,
        turn: u32,
    },
    CombatUnitMoved {
        combat: CombatId,
        urn: Urn,
        to: CombatPos,
        moves_left: i32,
    },
    CombatStrike {
        combat: CombatId,
        attacker: Urn,
        target: Urn,
        damage: i32,
        retaliation: i32,
    },
    CombatDecisionRequired {
        combat: CombatId,
        settlement: Urn,
    },
    CombatClosed {
        combat: CombatId,
        summary: CombatSummary,
    },
    CombatWithdrawn {
        combat: CombatId,
    },
}

impl UpdateRecord {
    /// The unit a record is about, if it concerns exactly one.
    pub fn unit_urn(&self) -> Option<Urn> {
        match self {
            UpdateRecord::UnitUpserted { unit } => Some(unit.urn),
            UpdateRecord::UnitMoved { urn, .. }
            | UpdateRecord::UnitPatched { urn, .. }
            | UpdateRecord::UnitLeftView { urn, .. }
            | UpdateRecord::UnitRemoved { urn, .. } => Some(*urn),
            _ => None,
        }
    }

    pub fn is_combat_notice(&self) -> bool {
        matches!(
            self,
            UpdateRecord::CombatScheduled { .. }
                | UpdateRecord::CombatRequested { .. }
                | UpdateRecord::CombatHeld { .. }
                | UpdateRecord::CombatActivated { .. }
                | UpdateRecord::CombatTurn { .. }
                | UpdateRecord::CombatUnitMoved { .. }
                | UpdateRecord::CombatStrike { .. }
                | UpdateRecord::CombatDecisionRequired { .. }
                | UpdateRecord::CombatClosed { .. }
                | UpdateRecord::CombatWithdrawn { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    Died,
    Dismissed,
    Captured,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Captured,
    Razed,
    Held,
    /// The settlement no longer existed when the fight ended.
    Vanished,
    /// Someone else held the settlement by the time the outcome was applied.
    Contested,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSummary {
    pub winner: Option<PlayerId>,
    #[serde(default)]
    pub casualties: Vec<Urn>,
    #[serde(default)]
    pub fled: Vec<Urn>,
    #[serde(default)]
    pub prisoners: Vec<Urn>,
    #[serde(default)]
    pub dismissed_prisoners: Vec<Urn>,
    #[serde(default)]
    pub loot_gold: i32,
    #[serde(default)]
    pub fame: Vec<(PlayerId, i32)>,
    #[serde(default)]
    pub settlement: Option<SettlementOutcome>,
}
