//! Position lifecycle: admission, exit monitoring, and ledger bookkeeping
//! through the public engine API.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

use sniper::engine::monitor::{MonitorOutcome, MonitorSettings};
use sniper::engine::positions::{ManagerSettings, PositionManager};
use sniper::engine::EngineEvent;
use sniper::strategy::exits::{ExitPolicy, ExitTable};
use sniper::types::{AdmissionRejected, CloseReason, EngineError, SourceKind};

use crate::mock_venue::{candidate, ScriptedOracle, ScriptedVenue};

struct Harness {
    manager: Arc<PositionManager>,
    venue: Arc<ScriptedVenue>,
    oracle: Arc<ScriptedOracle>,
}

fn harness(venue: ScriptedVenue, exits: ExitTable, max_positions: usize) -> Harness {
    let venue = Arc::new(venue);
    let oracle = Arc::new(ScriptedOracle::new());
    let manager = PositionManager::new(
        venue.clone(),
        oracle.clone(),
        exits,
        ManagerSettings {
            budget: dec!(1),
            max_positions,
            ..ManagerSettings::default()
        },
        MonitorSettings::default(),
    );
    Harness {
        manager,
        venue,
        oracle,
    }
}

/// Entry 1.0, target 2.0, stop 0.5 for every source.
fn even_exits() -> ExitTable {
    ExitTable::baseline_only(ExitPolicy::new(dec!(2.0), dec!(0.5)))
}

#[tokio::test(start_paused = true)]
async fn admitted_candidate_gets_its_source_exit_pair() {
    let h = harness(ScriptedVenue::new(dec!(0.002)), ExitTable::default(), 5);

    let pump = h
        .manager
        .open(&candidate("pump1", SourceKind::PumpEarly), 100)
        .await
        .unwrap();
    let koth = h
        .manager
        .open(&candidate("koth1", SourceKind::KingOfHill), 90)
        .await
        .unwrap();

    assert_eq!((pump.target_multiplier, pump.stop_multiplier), (dec!(20), dec!(0.30)));
    assert_eq!((koth.target_multiplier, koth.stop_multiplier), (dec!(8), dec!(0.30)));
    assert_eq!(pump.entry_price, dec!(0.002));
    assert_eq!(pump.quantity, dec!(500));
    assert_eq!(h.manager.open_count().await, 2);
    assert!(h.manager.was_traded("pump1"));
}

#[tokio::test(start_paused = true)]
async fn price_exactly_at_target_closes_as_target_hit() {
    let h = harness(ScriptedVenue::new(dec!(1.0)), even_exits(), 5);
    h.oracle.set("t1", dec!(1.3));
    h.venue.set_sell_price(dec!(2.0));

    h.manager.open(&candidate("t1", SourceKind::Dex), 70).await.unwrap();
    // first check at 10s holds, the second at 25s sees the target
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert!(h.manager.is_open("t1").await);
    h.oracle.set("t1", dec!(2.0));

    let outcome = h.manager.take_monitor("t1").unwrap().await.unwrap();
    assert_eq!(outcome, MonitorOutcome::Closed(CloseReason::TargetHit));

    let trades = h.manager.trades().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].reason, CloseReason::TargetHit);
    assert_eq!(trades[0].multiplier, Some(dec!(2)));
    assert_eq!(trades[0].profit, dec!(1));
}

#[tokio::test(start_paused = true)]
async fn price_exactly_at_stop_closes_as_stop_hit() {
    let h = harness(ScriptedVenue::new(dec!(1.0)), even_exits(), 5);
    h.oracle.set("s1", dec!(0.5));
    h.venue.set_sell_price(dec!(0.5));

    h.manager.open(&candidate("s1", SourceKind::DexFresh), 60).await.unwrap();
    let outcome = h.manager.take_monitor("s1").unwrap().await.unwrap();

    assert_eq!(outcome, MonitorOutcome::Closed(CloseReason::StopHit));
    let stats = h.manager.stats().await;
    assert_eq!(stats.trades, 1);
    assert_eq!(stats.wins, 0);
    assert_eq!(stats.total_profit, dec!(-0.5));
}

#[tokio::test(start_paused = true)]
async fn two_failed_sells_then_success_closes_normally() {
    let h = harness(ScriptedVenue::new(dec!(1.0)), even_exits(), 5);
    h.oracle.set("d1", dec!(2.5));
    h.venue.queue_sell_failure("blockhash not found");
    h.venue.queue_sell_failure("slippage exceeded");
    h.venue.queue_sell(dec!(2.4));
    let mut events = h.manager.subscribe();

    h.manager.open(&candidate("d1", SourceKind::Dex), 70).await.unwrap();

    // first attempt at 10s fails, retry waits 30s
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(h.manager.is_open("d1").await);
    assert_eq!(h.venue.sell_calls(), 1);

    // second attempt at 40s fails too
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.manager.is_open("d1").await);
    assert_eq!(h.venue.sell_calls(), 2);
    assert!(h.manager.trades().await.is_empty());

    let outcome = h.manager.take_monitor("d1").unwrap().await.unwrap();
    assert_eq!(outcome, MonitorOutcome::Closed(CloseReason::TargetHit));
    assert_eq!(h.venue.sell_calls(), 3);

    let trades = h.manager.trades().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_price, Some(dec!(2.4)));

    let mut sell_failed = 0;
    let mut closed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::SellFailed { .. } => sell_failed += 1,
            EngineEvent::Closed(_) => closed += 1,
            EngineEvent::ForceClosed(_) => panic!("position should not be abandoned"),
            _ => {}
        }
    }
    assert_eq!((sell_failed, closed), (2, 1));
}

#[tokio::test(start_paused = true)]
async fn unpriced_position_keeps_being_watched() {
    let h = harness(ScriptedVenue::new(dec!(1.0)), even_exits(), 5);
    h.manager.open(&candidate("np", SourceKind::Dex), 70).await.unwrap();

    // no price published: every check backs off and retries
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.manager.is_open("np").await);
    assert_eq!(h.venue.sell_calls(), 0);

    h.oracle.set("np", dec!(0.2));
    let outcome = h.manager.take_monitor("np").unwrap().await.unwrap();
    assert_eq!(outcome, MonitorOutcome::Closed(CloseReason::StopHit));
}

#[tokio::test(start_paused = true)]
async fn concurrent_closes_sell_once() {
    let venue = ScriptedVenue::new(dec!(1.0)).with_latency(Duration::from_millis(500));
    let h = harness(venue, even_exits(), 5);
    h.manager.open(&candidate("mx", SourceKind::Dex), 70).await.unwrap();

    let a = {
        let m = h.manager.clone();
        tokio::spawn(async move { m.close("mx", CloseReason::OperatorStop).await })
    };
    let b = {
        let m = h.manager.clone();
        tokio::spawn(async move { m.close("mx", CloseReason::OperatorStop).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let in_progress = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::CloseInProgress(_))))
        .count();
    assert_eq!((ok, in_progress), (1, 1));
    assert_eq!(h.venue.sell_calls(), 1);
    assert_eq!(h.manager.trades().await.len(), 1);

    // a later close is a no-op
    assert!(matches!(
        h.manager.close("mx", CloseReason::OperatorStop).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_admissions_respect_capacity() {
    let venue = ScriptedVenue::new(dec!(1.0)).with_latency(Duration::from_secs(1));
    let h = harness(venue, even_exits(), 3);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let m = h.manager.clone();
            tokio::spawn(async move {
                m.open(&candidate(&format!("c{i}"), SourceKind::Dex), 70).await
            })
        })
        .collect();

    let mut opened = 0;
    let mut at_capacity = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(EngineError::Rejected {
                reason: AdmissionRejected::AtCapacity { .. },
                ..
            }) => at_capacity += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((opened, at_capacity), (3, 5));
    assert_eq!(h.manager.open_count().await, 3);
    assert_eq!(h.venue.buy_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_admissions_of_one_asset_open_once() {
    let venue = ScriptedVenue::new(dec!(1.0)).with_latency(Duration::from_secs(1));
    let h = harness(venue, even_exits(), 5);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let m = h.manager.clone();
            tokio::spawn(async move { m.open(&candidate("dup", SourceKind::Dex), 70).await })
        })
        .collect();

    let mut opened = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(e) => assert!(matches!(
                e,
                EngineError::Rejected {
                    reason: AdmissionRejected::AlreadyOpen,
                    ..
                }
            )),
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(h.venue.buy_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_buy_can_be_retried() {
    let h = harness(ScriptedVenue::new(dec!(1.0)), even_exits(), 5);
    h.venue.fail_next_buys(1);

    let err = h.manager.open(&candidate("r1", SourceKind::Dex), 70).await;
    assert_err!(&err);
    assert!(!h.manager.was_traded("r1"));

    h.manager.open(&candidate("r1", SourceKind::Dex), 70).await.unwrap();
    assert!(h.manager.is_open("r1").await);
}

#[tokio::test(start_paused = true)]
async fn every_closed_position_is_recorded_once() {
    let h = harness(ScriptedVenue::new(dec!(1.0)), even_exits(), 5);
    for id in ["l1", "l2", "l3", "l4"] {
        h.oracle.set(id, dec!(1.1));
        h.manager.open(&candidate(id, SourceKind::Dex), 70).await.unwrap();
    }

    // l1 via its monitor, l2 by operator, l3 abandoned, l4 left open
    h.oracle.set("l1", dec!(3.0));
    h.venue.set_sell_price(dec!(3.0));
    let outcome = h.manager.take_monitor("l1").unwrap().await.unwrap();
    assert_eq!(outcome, MonitorOutcome::Closed(CloseReason::TargetHit));

    h.manager.close("l2", CloseReason::OperatorStop).await.unwrap();
    h.manager.force_close("l3").await.unwrap();

    let snapshot = h.manager.snapshot().await;
    let recorded: Vec<&str> = snapshot.trades.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(recorded.len(), 3);
    let unique: HashSet<&str> = recorded.iter().copied().collect();
    assert_eq!(unique, HashSet::from(["l1", "l2", "l3"]));
    assert_eq!(snapshot.open_positions.len(), 1);
    assert_eq!(snapshot.open_positions[0].id, "l4");

    let abandoned = snapshot.trades.iter().find(|t| t.id == "l3").unwrap();
    assert_eq!(abandoned.reason, CloseReason::ExecutionFailure);
    assert_eq!(abandoned.profit, Decimal::ZERO);

    // monitors of the other closed positions wind down on their next check
    for id in ["l2", "l3"] {
        let outcome = h.manager.take_monitor(id).unwrap().await.unwrap();
        assert_eq!(outcome, MonitorOutcome::ClosedElsewhere);
    }
    assert_eq!(h.manager.trades().await.len(), 3);
    assert!(h.manager.is_open("l4").await);
}
