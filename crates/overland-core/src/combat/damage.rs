use crate::combat::Combatant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrikeOutcome {
    pub damage: i32,
    /// Damage dealt back to the striker; zero when the target falls.
    pub retaliation: i32,
}

/// Damage arithmetic. The orchestrator only sequences strikes; it never computes them.
pub trait DamageResolver: Send {
    fn strike(&mut self, attacker: &Combatant, target: &Combatant) -> StrikeOutcome;
}

/// Attack minus defence, at least one point. Deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatDamage;

impl DamageResolver for FlatDamage {
    fn strike(&mut self, attacker: &Combatant, target: &Combatant) -> StrikeOutcome {
        let damage = (attacker.attack - target.defense).max(1);
        let retaliation = if target.hit_points > damage {
            (target.attack - attacker.defense).max(0)
        } else {
            0
        };
        StrikeOutcome {
            damage,
            retaliation,
        }
    }
}
