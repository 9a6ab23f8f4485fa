use overland_protocol::PlayerId;

use crate::error::ConsistencyError;

/// Lifecycle of one scheduled combat.
///
/// ```text
/// Queued -> Requested{by} -> Active -> Resolving -> AwaitingDecision -> Closed
///   |            |                         \______________________________/
///   +------------+--> Withdrawn
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombatPhase {
    Queued,
    Requested { by: PlayerId },
    Active,
    Resolving,
    AwaitingDecision { decider: PlayerId },
    Closed,
    Withdrawn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseEvent {
    Request { by: PlayerId },
    Unrequest,
    Begin,
    Withdraw,
    Conclude,
    AwaitDecision { decider: PlayerId },
    Close,
}

impl CombatPhase {
    /// The transition table. Anything not listed is a consistency error.
    pub fn transition(self, event: PhaseEvent) -> Result<CombatPhase, ConsistencyError> {
        use CombatPhase::*;
        use PhaseEvent as E;

        let next = match (self, event) {
            (Queued, E::Request { by }) => Requested { by },
            (Requested { by }, E::Request { .. }) => Requested { by },
            (Requested { .. }, E::Unrequest) => Queued,
            (Queued | Requested { .. }, E::Begin) => Active,
            (Queued | Requested { .. }, E::Withdraw) => Withdrawn,
            (Active, E::Conclude) => Resolving,
            (Resolving, E::AwaitDecision { decider }) => AwaitingDecision { decider },
            (Resolving | AwaitingDecision { .. }, E::Close) => Closed,
            (from, event) => return Err(ConsistencyError::IllegalTransition { from, event }),
        };
        Ok(next)
    }

    /// Scheduled but not yet fought.
    pub fn is_pending(self) -> bool {
        matches!(self, CombatPhase::Queued | CombatPhase::Requested { .. })
    }

    pub fn is_over(self) -> bool {
        matches!(self, CombatPhase::Closed | CombatPhase::Withdrawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PlayerId = PlayerId(0);
    const B: PlayerId = PlayerId(1);

    #[test]
    fn happy_path_through_a_settlement_fight() {
        let mut phase = CombatPhase::Queued;
        for event in [
            PhaseEvent::Request { by: A },
            PhaseEvent::Request { by: B },
            PhaseEvent::Begin,
            PhaseEvent::Conclude,
            PhaseEvent::AwaitDecision { decider: A },
            PhaseEvent::Close,
        ] {
            phase = phase.transition(event).expect("legal");
        }
        assert_eq!(phase, CombatPhase::Closed);
    }

    #[test]
    fn second_request_keeps_the_first_requester() {
        let phase = CombatPhase::Requested { by: A }
            .transition(PhaseEvent::Request { by: B })
            .expect("legal");
        assert_eq!(phase, CombatPhase::Requested { by: A });
    }

    #[test]
    fn active_combats_cannot_be_withdrawn_or_restarted() {
        assert!(CombatPhase::Active.transition(PhaseEvent::Withdraw).is_err());
        assert!(CombatPhase::Active.transition(PhaseEvent::Begin).is_err());
        assert!(CombatPhase::Closed.transition(PhaseEvent::Request { by: A }).is_err());
        assert!(CombatPhase::Withdrawn.transition(PhaseEvent::Begin).is_err());
    }
}
