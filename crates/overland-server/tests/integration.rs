//! Integration tests for the session actor.
//!
//! Drives a session through its handle the way the transport does and reads
//! what it would have put on the wire.

use std::time::{Duration, Instant};

use overland_core::{
    load_rules, CombatPhase, Game, MapShape, OverlandMap, PlayerMemory, PlayerSetup, RulesSource,
    SideKind,
};
use overland_protocol::{
    CombatId, Coordinate, Intent, IntentId, IntentKind, PlayerId, TerrainKind, UpdateRecord, Urn,
};
use overland_server::{
    Courier, Outbound, ServerMessage, SessionActor, SessionHandle, SessionSettings,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::assert_ok;

const A: PlayerId = PlayerId(0);
const B: PlayerId = PlayerId(1);

fn settings() -> SessionSettings {
    SessionSettings {
        disconnect_grace: Duration::from_secs(60),
        outbox_warn_threshold: 8,
        auto_think_budget: Duration::from_secs(5),
    }
}

fn table(players: Vec<PlayerSetup>) -> Game {
    let rules = load_rules(RulesSource::Embedded).unwrap();
    let map = OverlandMap::new(MapShape::new(12, 12, 1, false), TerrainKind::Grassland);
    Game::new(rules, map, players)
}

fn at(x: i32, y: i32) -> Coordinate {
    Coordinate::new(x, y, 0)
}

fn intent(id: u64, player: PlayerId, kind: IntentKind) -> Intent {
    Intent {
        id: IntentId(id),
        player,
        kind,
    }
}

/// Round-trips through the actor so every earlier command has been handled.
async fn settle(session: &SessionHandle) {
    assert_ok!(session.inspect(|_| ()).await);
}

fn drain(outbound: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(message) = outbound.try_recv() {
        out.push(message);
    }
    out
}

fn records_for(out: &[Outbound], client_id: u64) -> Vec<UpdateRecord> {
    out.iter()
        .filter(|o| o.client_id == client_id)
        .filter_map(|o| match &o.message {
            ServerMessage::Updates { records } => Some(records.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn token_for(out: &[Outbound], client_id: u64) -> String {
    out.iter()
        .find_map(|o| match &o.message {
            ServerMessage::Welcome { token, .. } if o.client_id == client_id => Some(token.clone()),
            _ => None,
        })
        .expect("welcome")
}

async fn pending_combat(session: &SessionHandle, player: PlayerId) -> CombatId {
    session
        .inspect(move |g| g.combats().pending_for(player)[0])
        .await
        .unwrap()
}

/// Test that a joining player is welcomed and then sent what it can see.
#[tokio::test]
async fn join_welcomes_then_sends_the_initial_view() {
    let mut game = table(vec![PlayerSetup::human("Ada"), PlayerSetup::ai("Brute")]);
    game.writer().spawn_unit(A, "scouts", at(3, 3)).unwrap();
    let (session, mut outbound, _task) = SessionActor::spawn(game, settings());

    assert_ok!(session.join(1, "Ada", None).await);
    settle(&session).await;
    let out = drain(&mut outbound);

    assert!(matches!(
        out[0].message,
        ServerMessage::Welcome { player: A, .. }
    ));
    let records = records_for(&out, 1);
    assert!(records
        .iter()
        .any(|r| matches!(r, UpdateRecord::CellRevealed { cell, .. } if cell.coord == at(3, 3))));
}

/// Test that intents are refused for foreign players and unseated clients.
#[tokio::test]
async fn intents_are_checked_against_the_seat() {
    let game = table(vec![PlayerSetup::human("Ada"), PlayerSetup::human("Bo")]);
    let (session, mut outbound, _task) = SessionActor::spawn(game, settings());
    assert_ok!(session.join(1, "Ada", None).await);
    settle(&session).await;
    drain(&mut outbound);

    session
        .submit(1, intent(1, B, IntentKind::EndTurn))
        .await
        .unwrap();
    session
        .submit(9, intent(1, A, IntentKind::EndTurn))
        .await
        .unwrap();
    session
        .submit(1, intent(2, A, IntentKind::DismissUnit { unit: Urn(77) }))
        .await
        .unwrap();
    settle(&session).await;

    let rejected: Vec<(IntentId, bool)> = drain(&mut outbound)
        .into_iter()
        .filter_map(|o| match o.message {
            ServerMessage::Rejected { intent, retry, .. } => Some((intent, retry)),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec![(IntentId(1), false), (IntentId(2), false)]);
    let ended = session.inspect(|g| g.has_ended_turn(A)).await.unwrap();
    assert!(!ended);
}

/// Test that a player's records wait while away and arrive in order on reconnect.
#[tokio::test]
async fn outbox_flushes_in_order_on_reconnect() {
    let mut game = table(vec![PlayerSetup::human("Ada"), PlayerSetup::human("Bo")]);
    let scout = game.writer().spawn_unit(A, "scouts", at(2, 5)).unwrap();
    game.writer().spawn_unit(B, "scouts", at(6, 5)).unwrap();
    let (session, mut outbound, _task) = SessionActor::spawn(game, settings());

    assert_ok!(session.join(1, "Ada", None).await);
    assert_ok!(session.join(2, "Bo", None).await);
    settle(&session).await;
    let first = drain(&mut outbound);
    let token = token_for(&first, 2);
    let mut seen_by_b = records_for(&first, 2);

    session.leave(2).await.unwrap();
    session
        .submit(
            1,
            intent(
                1,
                A,
                IntentKind::MoveStack {
                    units: vec![scout],
                    to: at(4, 5),
                },
            ),
        )
        .await
        .unwrap();
    settle(&session).await;
    let while_away = drain(&mut outbound);
    assert!(while_away.iter().all(|o| o.client_id != 2));
    let backlog = session.inspect(|g| g.pending_updates(B)).await.unwrap();
    assert!(backlog > 0);

    assert_ok!(session.join(3, "Bo", Some(token)).await);
    settle(&session).await;
    let back = drain(&mut outbound);
    assert!(matches!(back[0].message, ServerMessage::Welcome { player: B, .. }));
    let flushed = records_for(&back, 3);
    assert_eq!(flushed.len(), backlog);
    seen_by_b.extend(flushed);

    let memory = session
        .inspect(|g| g.memory(B).cloned())
        .await
        .unwrap()
        .unwrap();
    let mut replica = PlayerMemory::new(B, memory.shape());
    for record in &seen_by_b {
        replica.apply(record);
    }
    for index in 0..memory.shape().len() {
        let coord = memory.shape().coordinate_at(index).unwrap();
        assert_eq!(replica.view(coord), memory.view(coord));
    }
}

/// Test that updates flushed to a client the transport already lost reach its next connection.
#[tokio::test]
async fn updates_to_a_vanished_client_arrive_after_rejoin() {
    let mut game = table(vec![PlayerSetup::human("Ada"), PlayerSetup::human("Bo")]);
    let scout = game.writer().spawn_unit(A, "scouts", at(2, 5)).unwrap();
    game.writer().spawn_unit(B, "scouts", at(6, 5)).unwrap();
    let (session, mut outbound, _task) = SessionActor::spawn(game, settings());
    let mut courier = Courier::new();
    let mut wire: Vec<(u64, ServerMessage)> = Vec::new();
    let mut pump = |courier: &mut Courier, out: Vec<Outbound>, live: &[u64]| {
        for o in out {
            wire.extend(courier.route(o, |id| live.contains(&id)));
        }
    };

    assert_ok!(session.join(1, "Ada", None).await);
    assert_ok!(session.join(2, "Bo", None).await);
    settle(&session).await;
    let first = drain(&mut outbound);
    let token = token_for(&first, 2);
    pump(&mut courier, first, &[1, 2]);

    // Bo's connection is gone before the session hears about it.
    let step = IntentKind::MoveStack {
        units: vec![scout],
        to: at(4, 5),
    };
    assert_ok!(session.submit(1, intent(1, A, step)).await);
    settle(&session).await;
    let lost = drain(&mut outbound);
    assert!(!records_for(&lost, 2).is_empty());
    pump(&mut courier, lost, &[1]);
    assert!(courier.stranded(B) > 0);

    assert_ok!(session.leave(2).await);
    assert_ok!(session.join(3, "Bo", Some(token)).await);
    settle(&session).await;
    pump(&mut courier, drain(&mut outbound), &[1, 3]);
    assert_eq!(courier.stranded(B), 0);

    let received: Vec<UpdateRecord> = wire
        .iter()
        .filter(|(client, _)| *client == 2 || *client == 3)
        .filter_map(|(_, m)| match m {
            ServerMessage::Updates { records } => Some(records.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    let memory = session
        .inspect(|g| g.memory(B).cloned())
        .await
        .unwrap()
        .unwrap();
    let mut replica = PlayerMemory::new(B, memory.shape());
    for record in &received {
        replica.apply(record);
    }
    for index in 0..memory.shape().len() {
        let coord = memory.shape().coordinate_at(index).unwrap();
        assert_eq!(replica.view(coord), memory.view(coord));
    }
}

/// Test that an automatic side's turn is planned off the actor and applied.
#[tokio::test]
async fn automatic_turn_is_planned_and_applied() {
    let mut game = table(vec![PlayerSetup::human("Ada"), PlayerSetup::ai("Brute")]);
    let sword = game.writer().spawn_unit(A, "swordsmen", at(4, 5)).unwrap();
    game.writer().spawn_unit(B, "spearmen", at(5, 5)).unwrap();
    let (session, _outbound, _task) = SessionActor::spawn(game, settings());
    assert_ok!(session.join(1, "Ada", None).await);

    session
        .submit(
            1,
            intent(
                1,
                A,
                IntentKind::MoveStack {
                    units: vec![sword],
                    to: at(5, 5),
                },
            ),
        )
        .await
        .unwrap();
    settle(&session).await;
    let combat = pending_combat(&session, A).await;
    for (id, kind) in [
        (2, IntentKind::RequestCombat { combat }),
        (3, IntentKind::PassCombatUnit { combat, unit: sword }),
        (4, IntentKind::EndCombatTurn { combat }),
    ] {
        session.submit(1, intent(id, A, kind)).await.unwrap();
    }

    let mut state = None;
    for _ in 0..200 {
        let now = session
            .inspect(move |g| {
                let c = g.combats().combat(combat).unwrap();
                (c.phase(), c.current(), c.turn())
            })
            .await
            .unwrap();
        state = Some(now);
        if state.is_some_and(|(_, side, turn)| side == SideKind::Attacker && turn == 2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (phase, side, turn) = state.unwrap();
    assert_eq!(phase, CombatPhase::Active);
    assert_eq!((side, turn), (SideKind::Attacker, 2));
}

/// Test that an absent player's fights go to auto-control once grace expires.
#[tokio::test]
async fn expired_grace_hands_fights_to_auto_control() {
    let mut game = table(vec![PlayerSetup::human("Ada"), PlayerSetup::human("Bo")]);
    let sword = game.writer().spawn_unit(A, "swordsmen", at(4, 5)).unwrap();
    game.writer().spawn_unit(B, "spearmen", at(5, 5)).unwrap();
    let quick = SessionSettings {
        disconnect_grace: Duration::ZERO,
        ..settings()
    };
    let (session, _outbound, _task) = SessionActor::spawn(game, quick);
    assert_ok!(session.join(1, "Ada", None).await);
    assert_ok!(session.join(2, "Bo", None).await);

    session
        .submit(
            1,
            intent(
                1,
                A,
                IntentKind::MoveStack {
                    units: vec![sword],
                    to: at(5, 5),
                },
            ),
        )
        .await
        .unwrap();
    settle(&session).await;
    let combat = pending_combat(&session, A).await;
    session
        .submit(1, intent(2, A, IntentKind::RequestCombat { combat }))
        .await
        .unwrap();

    session.leave(2).await.unwrap();
    session.tick(Instant::now()).await.unwrap();
    settle(&session).await;

    let (phase, auto, ended) = session
        .inspect(move |g| {
            let c = g.combats().combat(combat).unwrap();
            (c.phase(), c.side(SideKind::Defender).auto, g.has_ended_turn(B))
        })
        .await
        .unwrap();
    assert_eq!(phase, CombatPhase::Active);
    assert!(auto);
    assert!(ended);
}
