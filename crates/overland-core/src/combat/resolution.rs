//! Writing a finished fight back into the world.
//!
//! Casualties are applied as soon as a combat leaves `Active`; loot,
//! prisoners, fame and the settlement outcome are applied exactly once, when
//! the combat closes.

use std::collections::BTreeMap;

use overland_protocol::{
    CaptureDecision, CombatSummary, Coordinate, Direction, PlayerId, SettlementOutcome, Urn,
};

use crate::combat::{Combat, SideKind};
use crate::error::{ConsistencyError, CoreError};
use crate::world::WorldWriter;

fn logged(result: Result<(), CoreError>, combat: &Combat, what: &str) {
    if let Err(error) = result {
        tracing::error!(combat = %combat.id, %error, "{what} failed during resolution");
    }
}

/// Kills the fallen, writes back survivors' wounds and clears every combat position.
pub(crate) fn apply_casualties(w: &mut WorldWriter<'_>, combat: &Combat, summary: &mut CombatSummary) {
    let winner = combat.winner().unwrap_or(SideKind::Defender);
    for fighter in combat.combatants() {
        let Some(current_hp) = w.world().unit(fighter.urn).map(|u| u.hit_points) else {
            tracing::error!(
                combat = %combat.id,
                error = %ConsistencyError::DanglingUrn(fighter.urn),
                "combatant vanished before resolution"
            );
            continue;
        };
        if !fighter.alive {
            logged(w.kill_unit(fighter.urn), combat, "kill");
            summary.casualties.push(fighter.urn);
            continue;
        }
        let wounds = current_hp - fighter.hit_points;
        if wounds > 0 {
            logged(w.damage_unit(fighter.urn, wounds), combat, "damage");
        }
        logged(w.set_combat_position(fighter.urn, None), combat, "clear position");
        if fighter.side == SideKind::Attacker && winner == SideKind::Defender {
            summary.fled.push(fighter.urn);
        }
    }
}

pub(crate) fn close(
    w: &mut WorldWriter<'_>,
    combat: &Combat,
    decision: Option<CaptureDecision>,
    summary: &mut CombatSummary,
) {
    let rewards = w.world().rules().rewards;
    let attacker = combat.attacker.player;
    let defender = combat.defender.player;
    let winner = combat.winner().unwrap_or(SideKind::Defender);
    let winner_player = combat.side(winner).player;
    summary.winner = (!winner_player.is_neutral()).then_some(winner_player);

    let heroes_lost = |side: SideKind| {
        combat
            .combatants()
            .filter(|c| c.side == side && c.hero && !c.alive)
            .count() as i32
    };
    let mut fame: BTreeMap<PlayerId, i32> = BTreeMap::new();

    if winner == SideKind::Attacker {
        *fame.entry(attacker).or_default() +=
            rewards.victory_fame + rewards.hero_fame * heroes_lost(SideKind::Defender);

        if let Some(urn) = combat.settlement {
            let town = w.world().settlement(urn).map(|s| (s.gold, s.owner));
            match town {
                None => {
                    tracing::error!(
                        combat = %combat.id,
                        error = %ConsistencyError::SettlementVanished { combat: combat.id, urn },
                        "skipping settlement outcome"
                    );
                    summary.settlement = Some(SettlementOutcome::Vanished);
                }
                Some((_, owner)) if owner != defender || defended_by_other(w, combat) => {
                    tracing::warn!(
                        combat = %combat.id,
                        settlement = %urn,
                        ?owner,
                        "settlement no longer held as fought; skipping settlement outcome"
                    );
                    summary.settlement = Some(SettlementOutcome::Contested);
                }
                Some((gold, _)) => {
                    let loot = gold * rewards.loot_percent / 100;
                    if loot > 0 {
                        logged(
                            w.adjust_settlement_gold(urn, -loot).map(|_| ()),
                            combat,
                            "loot",
                        );
                        w.adjust_gold(attacker, loot);
                        summary.loot_gold += loot;
                    }
                    match decision.unwrap_or(CaptureDecision::Capture) {
                        CaptureDecision::Capture => {
                            logged(w.set_settlement_owner(urn, attacker), combat, "capture");
                            summary.settlement = Some(SettlementOutcome::Captured);
                        }
                        CaptureDecision::Raze => {
                            logged(w.raze_settlement(urn), combat, "raze");
                            *fame.entry(attacker).or_default() -= rewards.raze_fame_penalty;
                            summary.settlement = Some(SettlementOutcome::Razed);
                        }
                    }
                }
            }
        }

        advance_survivors(w, combat);

        if combat.hazard {
            if let Some(hazard) = w.clear_hazard(combat.at) {
                if rewards.hazard_treasure > 0 {
                    w.adjust_gold(attacker, rewards.hazard_treasure);
                    summary.loot_gold += rewards.hazard_treasure;
                }
                place_prisoners(w, combat, &hazard.captives, attacker, summary);
            }
        }
    } else {
        if !defender.is_neutral() {
            *fame.entry(defender).or_default() +=
                rewards.victory_fame + rewards.hero_fame * heroes_lost(SideKind::Attacker);
        }
        if combat.settlement.is_some() {
            summary.settlement = Some(SettlementOutcome::Held);
        }
    }

    for (player, delta) in fame {
        if delta != 0 {
            w.adjust_fame(player, delta);
            summary.fame.push((player, delta));
        }
    }
}

/// Units other than the attacker's stand on the fought-over cell.
fn defended_by_other(w: &WorldWriter<'_>, combat: &Combat) -> bool {
    w.world()
        .units_at(combat.at)
        .iter()
        .any(|(_, u)| u.owner != combat.attacker.player)
}

/// The winning stack steps from where it attacked into the cleared cell, as
/// far as the stack limit allows. Nobody advances into a cell someone else
/// holds by now.
fn advance_survivors(w: &mut WorldWriter<'_>, combat: &Combat) {
    let attacker = combat.attacker.player;
    let world = w.world();
    let limit = world.rules().stack_limit;
    let taken = world
        .settlement_at(combat.at)
        .is_some_and(|(_, s)| s.owner != attacker);
    if taken || defended_by_other(w, combat) {
        tracing::debug!(combat = %combat.id, "target held by another; survivors stay put");
        return;
    }
    for fighter in combat.alive_on(SideKind::Attacker) {
        let world = w.world();
        if world.units_at(combat.at).len() >= limit {
            break;
        }
        let waiting = world.unit(fighter.urn).is_some_and(|u| {
            u.is_on_map() && u.owner == attacker && u.location == combat.from
        });
        if !waiting {
            continue;
        }
        logged(w.move_unit(fighter.urn, combat.at, 0), combat, "advance");
    }
}

/// Freed captives join the winner: with the stack, else the first free neighbor, else dismissed.
fn place_prisoners(
    w: &mut WorldWriter<'_>,
    combat: &Combat,
    captives: &[Urn],
    winner: PlayerId,
    summary: &mut CombatSummary,
) {
    let shape = w.world().shape();
    let limit = w.world().rules().stack_limit;
    let mut spots: Vec<Coordinate> = vec![combat.at];
    spots.extend(
        Direction::COMPASS
            .into_iter()
            .filter_map(|d| shape.step(combat.at, d)),
    );

    for urn in captives.iter().copied() {
        if w.world().unit(urn).is_none() {
            continue;
        }
        let spot = spots.iter().copied().find(|c| {
            let world = w.world();
            world.map().terrain(*c).is_some_and(|t| !t.is_water())
                && !world.is_hostile_to(winner, *c)
                && world.units_at(*c).len() < limit
        });
        logged(w.change_unit_owner(urn, winner), combat, "free captive");
        match spot {
            Some(at) => {
                logged(w.place_generated_unit(urn, at), combat, "place captive");
                summary.prisoners.push(urn);
            }
            None => {
                logged(w.dismiss_unit(urn), combat, "dismiss captive");
                summary.dismissed_prisoners.push(urn);
            }
        }
    }
}
