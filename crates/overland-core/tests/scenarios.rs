//! End-to-end scenarios driven through the intent pipeline.

use overland_core::movement::StackMember;
use overland_core::{
    compute_reachability, load_rules, Abilities, Budget, CombatPhase, EndReason, Game, IntentOutcome,
    MapShape, OverlandMap, PlayerMemory, PlayerSetup, Reachability, RulesSource, StackProfile,
};
use overland_protocol::{
    CaptureDecision, CombatId, Coordinate, Intent, IntentId, IntentKind, PlayerId, RejectionKind,
    SettlementOutcome, TerrainKind, UpdateRecord, Urn,
};

const A: PlayerId = PlayerId(0);
const B: PlayerId = PlayerId(1);
const C: PlayerId = PlayerId(2);

struct Table {
    game: Game,
    next_intent: u64,
}

impl Table {
    fn new(players: Vec<PlayerSetup>) -> Self {
        let rules = load_rules(RulesSource::Embedded).unwrap();
        let map = OverlandMap::new(MapShape::new(12, 12, 1, false), TerrainKind::Grassland);
        Self {
            game: Game::new(rules, map, players),
            next_intent: 0,
        }
    }

    fn humans(n: usize) -> Self {
        let names = ["A", "B", "C", "D"];
        Self::new(names[..n].iter().map(|n| PlayerSetup::human(*n)).collect())
    }

    fn spawn(&mut self, owner: PlayerId, kind: &str, at: Coordinate) -> Urn {
        self.game.writer().spawn_unit(owner, kind, at).unwrap()
    }

    fn submit(&mut self, player: PlayerId, kind: IntentKind) -> IntentOutcome {
        self.next_intent += 1;
        let outcome = self.game.apply(Intent {
            id: IntentId(self.next_intent),
            player,
            kind,
        });
        self.game.check_invariants().unwrap();
        outcome
    }

    fn move_stack(&mut self, player: PlayerId, units: &[Urn], to: Coordinate) -> IntentOutcome {
        self.submit(
            player,
            IntentKind::MoveStack {
                units: units.to_vec(),
                to,
            },
        )
    }

    fn phase(&self, id: CombatId) -> CombatPhase {
        self.game.combats().combat(id).unwrap().phase()
    }

    fn decide(&mut self, player: PlayerId, combat: CombatId, decision: CaptureDecision) -> IntentOutcome {
        self.submit(player, IntentKind::DecideCapture { combat, decision })
    }

    /// Both humans request the fight and hand it to auto-control, which plays it out.
    fn fight_automatically(&mut self, combat: CombatId, attacker: PlayerId, defender: PlayerId) {
        for player in [attacker, defender] {
            self.submit(player, IntentKind::RequestCombat { combat });
        }
        for player in [attacker, defender] {
            self.submit(player, IntentKind::SetAutoControl { combat, enabled: true });
        }
    }

    /// The one combat `player` has scheduled and not yet fought.
    fn pending(&self, player: PlayerId) -> CombatId {
        let pending = self.game.combats().pending_for(player);
        assert_eq!(pending.len(), 1, "expected exactly one pending combat");
        pending[0]
    }
}

fn at(x: i32, y: i32) -> Coordinate {
    Coordinate::new(x, y, 0)
}

fn retryable(outcome: IntentOutcome) -> bool {
    matches!(outcome, IntentOutcome::Rejected(r) if r.kind == RejectionKind::TryAgain)
}

/// Budgets of 2, 3 and 4 over cost-2 terrain: the stack reaches exactly its first ring.
#[test]
fn mixed_budget_stack_reaches_only_the_first_ring() {
    let table = Table::humans(1);
    let world = table.game.world();
    let origin = at(5, 5);
    let members = [2, 3, 4]
        .into_iter()
        .enumerate()
        .map(|(i, moves)| StackMember {
            urn: Urn(100 + i as u64),
            remaining: moves,
            per_turn: moves,
            abilities: Abilities::default(),
        })
        .collect();
    let profile = StackProfile { owner: A, members };
    assert_eq!(
        profile.budget(),
        Budget {
            remaining: 2,
            per_turn: 2
        }
    );

    let grid = compute_reachability(world.rules(), &profile, origin, profile.budget(), world);
    let mut this_turn = grid.this_turn_cells();
    this_turn.sort();
    let mut ring: Vec<Coordinate> = world.shape().coords_in_radius(origin, 1);
    ring.sort();
    assert_eq!(this_turn, ring);
    assert_eq!(
        grid.classification(at(7, 5)),
        Reachability::ReachableOnlyOverMultipleTurns
    );
}

/// A schedules and requests; the combat goes active only when B requests too.
#[test]
fn combat_activates_on_the_second_request() {
    let mut t = Table::humans(2);
    let attacker = t.spawn(A, "swordsmen", at(4, 5));
    t.spawn(B, "spearmen", at(5, 5));

    assert_eq!(t.move_stack(A, &[attacker], at(5, 5)), IntentOutcome::Applied);
    let id = t.pending(A);
    assert_eq!(t.phase(id), CombatPhase::Queued);
    assert_eq!(t.game.world().unit(attacker).unwrap().location, at(4, 5));

    t.submit(A, IntentKind::RequestCombat { combat: id });
    assert_eq!(t.phase(id), CombatPhase::Requested { by: A });
    assert_eq!(t.game.combats().fighting(A), None);

    t.submit(B, IntentKind::RequestCombat { combat: id });
    assert_eq!(t.phase(id), CombatPhase::Active);
    assert_eq!(t.game.combats().fighting(A), Some(id));
    assert_eq!(t.game.combats().fighting(B), Some(id));
}

/// Winning a settlement fight leaves the owner unchanged until the winner decides.
#[test]
fn settlement_changes_hands_only_on_decision() {
    let mut t = Table::humans(2);
    let attacker = t.spawn(A, "swordsmen", at(4, 5));
    let town = t.game.writer().found_settlement(B, "Harrow", at(5, 5)).unwrap();

    t.move_stack(A, &[attacker], at(5, 5));
    let id = t.pending(A);
    t.submit(A, IntentKind::RequestCombat { combat: id });
    t.submit(B, IntentKind::RequestCombat { combat: id });

    assert_eq!(t.phase(id), CombatPhase::AwaitingDecision { decider: A });
    assert_eq!(t.game.world().settlement(town).unwrap().owner, B);
    assert!(matches!(
        t.submit(
            B,
            IntentKind::DecideCapture {
                combat: id,
                decision: CaptureDecision::Raze
            }
        ),
        IntentOutcome::Rejected(_)
    ));

    t.submit(
        A,
        IntentKind::DecideCapture {
            combat: id,
            decision: CaptureDecision::Capture,
        },
    );
    assert_eq!(t.phase(id), CombatPhase::Closed);
    assert_eq!(t.game.world().settlement(town).unwrap().owner, A);
    let summary = t.game.combats().combat(id).unwrap().summary();
    assert_eq!(summary.settlement, Some(SettlementOutcome::Captured));
    assert_eq!(summary.winner, Some(A));
}

/// A request against a busy opponent is held, then promoted when that fight closes.
#[test]
fn held_request_promotes_after_the_other_fight_closes() {
    let mut t = Table::new(vec![
        PlayerSetup::human("A"),
        PlayerSetup::ai("B"),
        PlayerSetup::human("C"),
    ]);
    let raider = t.spawn(C, "swordsmen", at(2, 2));
    t.spawn(B, "spearmen", at(3, 2));
    let cavalry = t.spawn(A, "cavalry", at(9, 8));
    t.spawn(B, "spearmen", at(8, 8));

    t.move_stack(C, &[raider], at(3, 2));
    let first = t.pending(C);
    t.submit(C, IntentKind::RequestCombat { combat: first });
    assert_eq!(t.phase(first), CombatPhase::Active);

    t.move_stack(A, &[cavalry], at(8, 8));
    let second = t.pending(A);
    assert_eq!(
        t.submit(A, IntentKind::RequestCombat { combat: second }),
        IntentOutcome::Applied
    );
    assert!(t.phase(second).is_pending());
    assert_eq!(t.game.combats().combat(second).unwrap().held_on(), Some(B));

    t.submit(C, IntentKind::RetreatCombat { combat: first });
    assert_eq!(t.phase(first), CombatPhase::Closed);
    assert_eq!(t.phase(second), CombatPhase::Active);
    assert_eq!(t.game.combats().fighting(A), Some(second));
}

/// A player fighting one combat cannot join another; the rejection is retryable.
#[test]
fn second_combat_waits_while_the_first_is_fought() {
    let mut t = Table::humans(2);
    let north = t.spawn(A, "swordsmen", at(2, 2));
    let south = t.spawn(A, "swordsmen", at(9, 8));
    t.spawn(B, "spearmen", at(3, 2));
    t.spawn(B, "spearmen", at(8, 8));

    t.move_stack(A, &[north], at(3, 2));
    t.move_stack(A, &[south], at(8, 8));
    let pending = t.game.combats().pending_for(A);
    assert_eq!(pending.len(), 2);
    let (first, second) = (pending[0], pending[1]);

    t.submit(A, IntentKind::RequestCombat { combat: first });
    t.submit(B, IntentKind::RequestCombat { combat: first });
    assert_eq!(t.phase(first), CombatPhase::Active);

    for player in [A, B] {
        match t.submit(player, IntentKind::RequestCombat { combat: second }) {
            IntentOutcome::Rejected(rejection) => {
                assert_eq!(rejection.kind, RejectionKind::TryAgain)
            }
            other => panic!("expected a retryable rejection, got {other:?}"),
        }
    }
    assert!(t.phase(second).is_pending());
}

/// An automatic fight runs to closure inside one intent and leaves nobody enrolled.
#[test]
fn automatic_fight_closes_atomically() {
    let mut t = Table::new(vec![PlayerSetup::ai("A"), PlayerSetup::ai("B")]);
    let griffins = t.spawn(A, "griffins", at(4, 5));
    let defender = t.spawn(B, "spearmen", at(5, 5));

    assert_eq!(t.move_stack(A, &[griffins], at(5, 5)), IntentOutcome::Applied);
    let id = t.game.combats().combats().next().unwrap().id;
    assert_eq!(t.phase(id), CombatPhase::Closed);

    let world = t.game.world();
    assert!(world.units().all(|(_, u)| u.combat.is_none()));
    assert!(world.is_tombstoned(defender));
    assert_eq!(world.unit(griffins).unwrap().location, at(5, 5));
    assert_eq!(t.game.combats().fighting(A), None);
    let summary = t.game.combats().combat(id).unwrap().summary();
    assert_eq!(summary.casualties, vec![defender]);
    assert_eq!(world.player(A).unwrap().fame, 1);
}

/// Cells out of sight keep what was last seen until they come back into view.
#[test]
fn hidden_cells_stay_frozen_until_seen_again() {
    let mut t = Table::humans(2);
    let scout = t.spawn(A, "scouts", at(6, 5));
    let town = t.game.writer().found_settlement(B, "Harrow", at(8, 5)).unwrap();
    let seen = |t: &Table| {
        t.game
            .memory(A)
            .unwrap()
            .settlement(town)
            .map(|s| s.buildings.len())
    };
    assert_eq!(seen(&t), Some(0));

    t.move_stack(A, &[scout], at(4, 5));
    assert!(!t.game.memory(A).unwrap().cell(at(8, 5)).unwrap().visible);
    t.game.writer().complete_building(town, "granary").unwrap();
    t.game.check_invariants().unwrap();
    assert_eq!(seen(&t), Some(0));

    t.submit(A, IntentKind::EndTurn);
    t.submit(B, IntentKind::EndTurn);
    t.move_stack(A, &[scout], at(6, 5));
    assert_eq!(seen(&t), Some(1));
    assert_eq!(
        t.game.memory(A).unwrap().cell(at(8, 5)).unwrap().last_seen_turn,
        2
    );
}

/// Replaying a player's outbox onto an empty memory reproduces their memory exactly.
#[test]
fn outbox_replays_into_the_same_memory() {
    let mut t = Table::humans(2);
    let scout = t.spawn(A, "scouts", at(1, 1));
    let spear = t.spawn(B, "spearmen", at(4, 3));
    t.move_stack(A, &[scout], at(3, 1));
    t.move_stack(B, &[spear], at(5, 4));
    t.submit(A, IntentKind::DismissUnit { unit: scout });

    let records = t.game.drain_outbox(A);
    assert!(!records.is_empty());
    let memory = t.game.memory(A).unwrap();
    let mut replica = PlayerMemory::new(A, memory.shape());
    for record in &records {
        replica.apply(record);
    }
    assert_eq!(replica.turn(), memory.turn());
    for index in 0..memory.shape().len() {
        let coord = memory.shape().coordinate_at(index).unwrap();
        assert_eq!(replica.view(coord), memory.view(coord), "{coord:?}");
    }
    assert_eq!(t.game.pending_updates(A), 0);
}

/// Resubmitting an intent with the same id is a no-op.
#[test]
fn duplicate_intent_is_ignored() {
    let mut t = Table::humans(2);
    let scout = t.spawn(A, "scouts", at(1, 1));
    let intent = Intent {
        id: IntentId(42),
        player: A,
        kind: IntentKind::MoveStack {
            units: vec![scout],
            to: at(2, 1),
        },
    };
    assert_eq!(t.game.apply(intent.clone()), IntentOutcome::Applied);
    let after_first = t.game.world().unit(scout).unwrap().moves_left;
    assert_eq!(t.game.apply(intent), IntentOutcome::Duplicate);
    assert_eq!(t.game.world().unit(scout).unwrap().moves_left, after_first);
}

/// Survivors waiting on a capture decision cannot walk off, and nobody else can enter the cell.
#[test]
fn survivors_hold_position_until_the_decision() {
    let mut t = Table::humans(2);
    let cavalry = t.spawn(A, "cavalry", at(4, 5));
    let scouts = t.spawn(A, "scouts", at(4, 6));
    let town = t.game.writer().found_settlement(B, "Harrow", at(5, 5)).unwrap();

    t.move_stack(A, &[cavalry], at(5, 5));
    let id = t.pending(A);
    t.submit(A, IntentKind::RequestCombat { combat: id });
    t.submit(B, IntentKind::RequestCombat { combat: id });
    assert_eq!(t.phase(id), CombatPhase::AwaitingDecision { decider: A });

    assert!(retryable(t.move_stack(A, &[cavalry], at(3, 5))));
    assert!(retryable(t.submit(A, IntentKind::DismissUnit { unit: cavalry })));
    assert!(retryable(t.move_stack(A, &[scouts], at(5, 5))));
    let world = t.game.world();
    assert_eq!(world.unit(cavalry).unwrap().location, at(4, 5));
    assert_eq!(world.unit(scouts).unwrap().location, at(4, 6));

    t.decide(A, id, CaptureDecision::Capture);
    let world = t.game.world();
    assert_eq!(world.settlement(town).unwrap().owner, A);
    assert_eq!(world.unit(cavalry).unwrap().location, at(5, 5));
    assert_eq!(t.move_stack(A, &[cavalry], at(6, 5)), IntentOutcome::Applied);
}

/// A third party cannot attack a settlement whose fate is still being decided.
#[test]
fn pending_decision_keeps_other_attackers_out() {
    let mut t = Table::new(vec![
        PlayerSetup::human("A"),
        PlayerSetup::human("B"),
        PlayerSetup::ai("C"),
    ]);
    let cavalry = t.spawn(A, "cavalry", at(4, 5));
    let raider = t.spawn(C, "swordsmen", at(6, 5));
    let town = t.game.writer().found_settlement(B, "Harrow", at(5, 5)).unwrap();

    t.move_stack(A, &[cavalry], at(5, 5));
    let id = t.pending(A);
    t.submit(A, IntentKind::RequestCombat { combat: id });
    t.submit(B, IntentKind::RequestCombat { combat: id });

    assert!(retryable(t.move_stack(C, &[raider], at(5, 5))));
    assert_eq!(t.game.combats().combats().count(), 1);
    assert_eq!(t.game.world().settlement(town).unwrap().owner, B);

    t.decide(A, id, CaptureDecision::Capture);
    let world = t.game.world();
    assert_eq!(world.settlement(town).unwrap().owner, A);
    assert!(world.units_at(at(5, 5)).iter().all(|(_, u)| u.owner == A));
}

/// If the settlement changed hands before the decision, the decision takes nothing.
#[test]
fn decision_on_a_settlement_held_by_someone_else_takes_nothing() {
    let mut t = Table::humans(3);
    let cavalry = t.spawn(A, "cavalry", at(4, 5));
    let town = t.game.writer().found_settlement(B, "Harrow", at(5, 5)).unwrap();

    t.move_stack(A, &[cavalry], at(5, 5));
    let id = t.pending(A);
    t.submit(A, IntentKind::RequestCombat { combat: id });
    t.submit(B, IntentKind::RequestCombat { combat: id });
    t.game.writer().set_settlement_owner(town, C).unwrap();
    t.game.check_invariants().unwrap();

    assert_eq!(t.decide(A, id, CaptureDecision::Capture), IntentOutcome::Applied);
    assert_eq!(t.phase(id), CombatPhase::Closed);
    let world = t.game.world();
    assert_eq!(world.settlement(town).unwrap().owner, C);
    assert_eq!(world.unit(cavalry).unwrap().location, at(4, 5));
    let summary = t.game.combats().combat(id).unwrap().summary();
    assert_eq!(summary.settlement, Some(SettlementOutcome::Contested));
    assert_eq!(summary.loot_gold, 0);
}

/// A settlement gone before the decision skips the settlement steps; casualties still count.
#[test]
fn vanished_settlement_still_finalizes_casualties() {
    let mut t = Table::humans(2);
    let griffins = t.spawn(A, "griffins", at(4, 5));
    let spear = t.spawn(B, "spearmen", at(5, 5));
    let town = t.game.writer().found_settlement(B, "Harrow", at(5, 5)).unwrap();

    t.move_stack(A, &[griffins], at(5, 5));
    let id = t.pending(A);
    t.fight_automatically(id, A, B);
    assert_eq!(t.phase(id), CombatPhase::AwaitingDecision { decider: A });
    assert!(t.game.world().is_tombstoned(spear));

    t.game.writer().raze_settlement(town).unwrap();
    t.game.check_invariants().unwrap();
    t.decide(A, id, CaptureDecision::Capture);

    assert_eq!(t.phase(id), CombatPhase::Closed);
    let summary = t.game.combats().combat(id).unwrap().summary();
    assert_eq!(summary.settlement, Some(SettlementOutcome::Vanished));
    assert_eq!(summary.casualties, vec![spear]);
    assert_eq!(summary.winner, Some(A));
    let world = t.game.world();
    assert!(world.units().all(|(_, u)| u.combat.is_none()));
    assert_eq!(world.player(A).unwrap().fame, 1);
}

/// Razing costs fame and everyone who sees the cell is told the settlement is gone.
#[test]
fn razing_costs_fame_and_removes_the_settlement_from_view() {
    let mut t = Table::humans(2);
    let cavalry = t.spawn(A, "cavalry", at(4, 5));
    let town = t.game.writer().found_settlement(B, "Harrow", at(5, 5)).unwrap();

    t.move_stack(A, &[cavalry], at(5, 5));
    let id = t.pending(A);
    t.submit(A, IntentKind::RequestCombat { combat: id });
    t.submit(B, IntentKind::RequestCombat { combat: id });
    t.game.drain_outbox(A);
    t.decide(A, id, CaptureDecision::Raze);

    let world = t.game.world();
    assert!(world.settlement(town).is_none());
    let rewards = world.rules().rewards;
    assert_eq!(
        world.player(A).unwrap().fame,
        rewards.victory_fame - rewards.raze_fame_penalty
    );
    let summary = t.game.combats().combat(id).unwrap().summary();
    assert_eq!(summary.settlement, Some(SettlementOutcome::Razed));

    let records = t.game.drain_outbox(A);
    assert!(records
        .iter()
        .any(|r| matches!(r, UpdateRecord::SettlementRemoved { urn, .. } if *urn == town)));
    assert!(t.game.memory(A).unwrap().settlement(town).is_none());
}

/// When neither side finishes the other within the turn limit, the defender holds.
#[test]
fn turn_limit_hands_the_fight_to_the_defender() {
    let mut t = Table::humans(2);
    let sword = t.spawn(A, "swordsmen", at(4, 5));
    let spear = t.spawn(B, "spearmen", at(5, 5));

    t.move_stack(A, &[sword], at(5, 5));
    let id = t.pending(A);
    t.submit(A, IntentKind::RequestCombat { combat: id });
    t.submit(B, IntentKind::RequestCombat { combat: id });

    let limit = t.game.world().rules().combat.turn_limit;
    for _ in 0..limit {
        for (player, unit) in [(A, sword), (B, spear)] {
            assert_eq!(t.phase(id), CombatPhase::Active);
            t.submit(player, IntentKind::PassCombatUnit { combat: id, unit });
            t.submit(player, IntentKind::EndCombatTurn { combat: id });
        }
    }

    let combat = t.game.combats().combat(id).unwrap();
    assert_eq!(combat.phase(), CombatPhase::Closed);
    assert_eq!(combat.end_reason(), Some(EndReason::TurnLimit));
    assert_eq!(combat.summary().winner, Some(B));
    assert!(combat.summary().casualties.is_empty());
    let world = t.game.world();
    assert_eq!(world.unit(sword).unwrap().location, at(4, 5));
    assert_eq!(world.unit(spear).unwrap().location, at(5, 5));
    assert_eq!(world.player(B).unwrap().fame, 1);
}
