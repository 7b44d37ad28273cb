//! # Engine Flow Tests
//!
//! `SyncEngine` end to end against the simulated PixelBoard:
//!
//! 1. **Loading**: fallback rows, supersession, retry from `Error`
//! 2. **Placement**: validation order, cooldown, optimistic rollback, timeout
//! 3. **Concurrency**: one placement in flight, reload racing a confirmation
//! 4. **Notifications**: listeners, live updates
//!
//! Run with: cargo test -p pixelwar_sync --test engine_flow

#![allow(clippy::unwrap_used)]

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use pixelwar_chain::{ContractGateway, GatewayConfig, SimulatedLedger};
use pixelwar_core::{
    Address, CanvasError, Coord, FailurePolicy, GridSize, ManualClock, PartialLoadFailure, Rgb,
    SessionAccount, Timestamp,
};
use pixelwar_sync::{CanvasEvent, EngineOptions, EngineState, SyncEngine, TxPhase};

const CONTRACT: Address = Address::repeat_byte(0xC0);
const PLAYER: Address = Address::repeat_byte(0x01);
const RIVAL: Address = Address::repeat_byte(0x02);
const FALLBACK: Rgb = Rgb::new(0x11, 0x11, 0x11);
const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);
const BLUE: Rgb = Rgb::new(0x00, 0x00, 0xFF);

type Engine = SyncEngine<ContractGateway<Arc<SimulatedLedger>>>;

struct Harness {
    sim: Arc<SimulatedLedger>,
    clock: Arc<ManualClock>,
    account: Arc<SessionAccount>,
    engine: Engine,
}

fn harness_with(size: u32, options: EngineOptions) -> Harness {
    let size = GridSize::new(size, size).unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(10_000)));
    let sim = Arc::new(SimulatedLedger::new(size, CONTRACT).with_clock(clock.clone()));
    let gateway = ContractGateway::new(
        Arc::clone(&sim),
        GatewayConfig {
            contract: CONTRACT,
            size,
            fallback: options.fallback,
            fetch_concurrency: 4,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
        },
    );
    let account = Arc::new(SessionAccount::connected(PLAYER));
    let engine = SyncEngine::new(gateway, account.clone(), clock.clone(), options);
    Harness {
        sim,
        clock,
        account,
        engine,
    }
}

fn harness(size: u32) -> Harness {
    harness_with(
        size,
        EngineOptions {
            fallback: FALLBACK,
            ..EngineOptions::default()
        },
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

// ============================================================================
// LOADING
// ============================================================================

#[tokio::test]
async fn failed_row_shows_fallback_and_warns() {
    let h = harness(5);
    for i in 0..5 {
        h.sim.paint_as(RIVAL, Coord::new(i, i), RED).unwrap();
    }
    h.sim.fail_rows([2]);

    let report = h.engine.refresh().await.unwrap();
    assert_eq!(report.warning, Some(PartialLoadFailure::new([2])));
    assert_eq!(report.grid[2], [FALLBACK; 5]);
    assert_eq!(report.grid[3][3], RED);
    assert_eq!(h.engine.state(), EngineState::Ready);
    assert_eq!(h.engine.last_warning(), Some(PartialLoadFailure::new([2])));
    assert_eq!(
        h.engine.notice().unwrap().message,
        "Grid loaded with errors (partial load failure, rows: 2)"
    );
}

#[tokio::test]
async fn failed_row_shows_fallback_on_every_load() {
    let h = harness(4);
    h.sim.paint_as(RIVAL, Coord::new(0, 1), BLUE).unwrap();
    let report = h.engine.refresh().await.unwrap();
    assert_eq!(report.grid[1][0], BLUE);

    h.sim.paint_as(RIVAL, Coord::new(0, 1), RED).unwrap();
    h.sim.fail_rows([1]);
    let report = h.engine.refresh().await.unwrap();

    assert_eq!(report.grid[1], [FALLBACK; 4]);
    assert_eq!(h.engine.snapshot()[1][0], FALLBACK);
    assert_eq!(report.warning, Some(PartialLoadFailure::new([1])));

    h.sim.heal_rows();
    let report = h.engine.refresh().await.unwrap();
    assert_eq!(report.grid[1][0], RED);
    assert_eq!(report.warning, None);
    assert_eq!(h.engine.last_warning(), None);
}

#[tokio::test]
async fn every_row_failing_moves_to_error() {
    let h = harness(3);
    h.sim.fail_rows([0, 1, 2]);

    assert!(h.engine.refresh().await.is_err());
    assert_eq!(h.engine.state(), EngineState::Error);
    assert_eq!(h.engine.notice().unwrap().message, "Failed to load the grid");

    h.sim.heal_rows();
    h.engine.refresh().await.unwrap();
    assert_eq!(h.engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn retry_from_error_reports_loading() {
    let h = harness(3);
    h.sim.fail_rows([0, 1, 2]);
    assert!(h.engine.refresh().await.is_err());
    assert_eq!(h.engine.state(), EngineState::Error);

    h.sim.heal_rows();
    h.sim.set_latency(Duration::from_millis(100));
    let engine = h.engine.clone();
    let retry = tokio::spawn(async move { engine.refresh().await });
    wait_until(|| h.engine.state() == EngineState::Loading).await;
    assert_eq!(h.engine.last_error(), None);

    retry.await.unwrap().unwrap();
    assert_eq!(h.engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn newer_refresh_supersedes_older() {
    let h = harness(3);
    h.sim.set_latency(Duration::from_millis(100));

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.refresh().await });
    wait_until(|| h.engine.state() == EngineState::Loading).await;

    let second = h.engine.refresh().await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(first.superseded);
    assert!(!second.superseded);
    assert_eq!(h.engine.state(), EngineState::Ready);
}

// ============================================================================
// PLACEMENT
// ============================================================================

#[tokio::test]
async fn place_then_read_back() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();

    let confirmation = h.engine.place(1, 1, "#ff0000").await.unwrap();
    assert_eq!(confirmation.coord, Coord::new(1, 1));
    assert_eq!(confirmation.color, RED);

    assert_eq!(h.engine.snapshot()[1][1], "#ff0000");
    assert_eq!(h.sim.pixel(Coord::new(1, 1)), Some(RED));
    let pixel = h.engine.pixel(1, 1).unwrap();
    assert_eq!(pixel.confirmed, RED);
    assert_eq!(pixel.pending, None);
    assert_eq!(h.engine.state(), EngineState::Ready);
    assert_eq!(h.engine.notice().unwrap().message, "Pixel placed at (1, 1)");
    assert!(!h.engine.get_cooldown_status().allowed);
}

#[tokio::test]
async fn out_of_bounds_and_bad_color_make_no_calls() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    let before = h.sim.total_requests();

    for (x, y) in [(-1, 0), (0, -1), (3, 0), (0, 3)] {
        assert!(matches!(
            h.engine.place(x, y, "#ffffff").await,
            Err(CanvasError::CoordinateOutOfBounds { .. })
        ));
    }
    assert!(matches!(
        h.engine.place(0, 0, "red").await,
        Err(CanvasError::InvalidColorFormat(_))
    ));
    assert!(matches!(
        h.engine.refresh_pixel(5, 5).await,
        Err(CanvasError::CoordinateOutOfBounds { .. })
    ));

    assert_eq!(h.sim.total_requests(), before);
    assert_eq!(h.engine.snapshot()[0][0], Rgb::BLACK);
}

#[tokio::test]
async fn cooldown_blocks_until_window_passes() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    h.engine.place(0, 0, "#ff0000").await.unwrap();
    let before = h.sim.total_requests();

    h.clock.advance(Duration::from_secs(20));
    assert_eq!(
        h.engine.place(1, 0, "#00ff00").await,
        Err(CanvasError::CooldownActive {
            remaining: Duration::from_secs(40)
        })
    );
    assert_eq!(h.engine.notice().unwrap().message, "Please wait 40 seconds");
    assert_eq!(h.sim.total_requests(), before);

    h.clock.advance(Duration::from_secs(40));
    assert!(h.engine.get_cooldown_status().allowed);
    h.engine.place(1, 0, "#00ff00").await.unwrap();
}

#[tokio::test]
async fn place_while_reloading_is_not_ready() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    h.sim.set_latency(Duration::from_millis(100));

    let engine = h.engine.clone();
    let reload = tokio::spawn(async move { engine.refresh().await });
    wait_until(|| h.engine.state() == EngineState::Loading).await;

    assert_eq!(
        h.engine.place(0, 0, "#ff0000").await,
        Err(CanvasError::NotReady)
    );
    assert_eq!(h.sim.stats().submissions.load(Ordering::SeqCst), 0);

    reload.await.unwrap().unwrap();
    h.engine.place(0, 0, "#ff0000").await.unwrap();
    assert_eq!(h.sim.pixel(Coord::new(0, 0)), Some(RED));
}

#[tokio::test(start_paused = true)]
async fn unsettled_placement_times_out_and_rolls_back() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    h.sim.hold_submissions();

    assert_eq!(
        h.engine.place(1, 1, "#ff0000").await,
        Err(CanvasError::NetworkTimeout)
    );

    assert_eq!(h.engine.snapshot()[1][1], Rgb::BLACK);
    assert_eq!(h.engine.pixel(1, 1).unwrap().pending, None);
    assert_eq!(h.engine.pending(), None);
    assert_eq!(h.engine.state(), EngineState::Ready);
    assert_eq!(
        h.engine.notice().unwrap().message,
        "Transaction failed: submission timed out"
    );
    assert_eq!(h.sim.pixel(Coord::new(1, 1)), Some(Rgb::BLACK));
}

#[tokio::test]
async fn rejected_submission_rolls_back_exact_value() {
    let h = harness(3);
    h.sim.paint_as(RIVAL, Coord::new(1, 1), BLUE).unwrap();
    h.engine.refresh().await.unwrap();

    h.sim.reject_next_submission();
    assert_eq!(
        h.engine.place(1, 1, "#ff0000").await,
        Err(CanvasError::SubmissionRejectedByUser)
    );

    assert_eq!(h.engine.snapshot()[1][1], BLUE);
    assert_eq!(h.engine.pixel(1, 1).unwrap().pending, None);
    assert_eq!(h.engine.state(), EngineState::Ready);
    assert!(h.engine.notice().unwrap().message.starts_with("Transaction failed"));
    // The attempt still counts against the cooldown.
    assert!(!h.engine.get_cooldown_status().allowed);
}

#[tokio::test]
async fn reset_policy_returns_the_cooldown() {
    let h = harness_with(
        3,
        EngineOptions {
            failure_policy: FailurePolicy::ResetCooldown,
            ..EngineOptions::default()
        },
    );
    h.engine.refresh().await.unwrap();

    h.sim.revert_next_submission("out of gas");
    assert_eq!(
        h.engine.place(2, 2, "#ff0000").await,
        Err(CanvasError::SubmissionReverted("out of gas".to_string()))
    );
    assert!(h.engine.get_cooldown_status().allowed);
    h.engine.place(2, 2, "#ff0000").await.unwrap();
}

#[tokio::test]
async fn switching_account_gets_a_fresh_window() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    h.engine.place(0, 0, "#ff0000").await.unwrap();
    assert!(!h.engine.get_cooldown_status().allowed);

    h.account.connect(RIVAL);
    assert!(h.engine.get_cooldown_status().allowed);
    h.engine.place(1, 0, "#0000ff").await.unwrap();
    assert_eq!(h.sim.pixel(Coord::new(1, 0)), Some(BLUE));
}

#[tokio::test]
async fn refresh_pixel_merges_one_remote_change() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    h.sim.paint_as(RIVAL, Coord::new(2, 0), BLUE).unwrap();

    let pixel = h.engine.refresh_pixel(2, 0).await.unwrap();
    assert_eq!(pixel.confirmed, BLUE);
    assert_eq!(pixel.last_changed_at, Some(Timestamp::from_secs(10_000)));
    assert_eq!(h.engine.snapshot()[0][2], BLUE);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test]
async fn second_placement_while_one_is_in_flight() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    h.sim.hold_submissions();

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.place(0, 0, "#ff0000").await });
    wait_until(|| h.sim.held_submissions() == 1).await;

    assert_eq!(h.engine.state(), EngineState::Submitting);
    assert_eq!(h.engine.pending().unwrap().phase, TxPhase::Submitted);
    let optimistic = h.engine.pixel(0, 0).unwrap();
    assert_eq!(optimistic.pending, Some(RED));
    assert_eq!(optimistic.effective(), RED);

    assert_eq!(
        h.engine.place(1, 1, "#00ff00").await,
        Err(CanvasError::SubmissionInProgress)
    );
    assert_eq!(h.sim.stats().submissions.load(Ordering::SeqCst), 1);

    h.sim.release_all();
    first.await.unwrap().unwrap();
    assert_eq!(h.engine.state(), EngineState::Ready);
    assert_eq!(h.engine.pending(), None);
    assert_eq!(h.engine.snapshot()[0][0], RED);
}

#[tokio::test(start_paused = true)]
async fn reload_read_before_a_confirmation_keeps_it() {
    let h = harness(5);
    h.sim.paint_as(RIVAL, Coord::new(0, 0), BLUE).unwrap();
    h.engine.refresh().await.unwrap();

    h.sim.hold_submissions();
    let engine = h.engine.clone();
    let placement = tokio::spawn(async move { engine.place(0, 0, "#ff0000").await });
    wait_until(|| h.sim.held_submissions() == 1).await;

    // Rows 0-3 are read at 200ms, while the placement is still held.
    // Row 4 is read at 400ms.
    h.sim.set_latency(Duration::from_millis(200));
    let engine = h.engine.clone();
    let reload = tokio::spawn(async move { engine.refresh().await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    h.sim.release_all();
    placement.await.unwrap().unwrap();
    assert_eq!(h.engine.snapshot()[0][0], RED);

    let report = reload.await.unwrap().unwrap();
    assert!(!report.superseded);
    assert_eq!(report.grid[0][0], RED);
    assert_eq!(h.engine.snapshot()[0][0], RED);
    assert_eq!(h.sim.pixel(Coord::new(0, 0)), Some(RED));

    // The next reload reads the ledger as usual.
    h.sim.set_latency(Duration::ZERO);
    h.sim.paint_as(RIVAL, Coord::new(0, 0), BLUE).unwrap();
    let report = h.engine.refresh().await.unwrap();
    assert_eq!(report.grid[0][0], BLUE);
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[tokio::test]
async fn listeners_see_state_changes_and_settlement() {
    let h = harness(3);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = h.engine.subscribe(move |event| sink.lock().push(event.clone()));

    h.engine.refresh().await.unwrap();
    h.engine.place(1, 2, "#ff0000").await.unwrap();

    let events = seen.lock().clone();
    let states: Vec<EngineState> = events
        .iter()
        .filter_map(|e| match e {
            CanvasEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        [
            EngineState::Loading,
            EngineState::Ready,
            EngineState::Submitting,
            EngineState::Ready
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, CanvasEvent::GridChanged(coords) if coords == &[Coord::new(1, 2)])));
    assert!(events.iter().any(|e| matches!(
        e,
        CanvasEvent::TransactionSettled(tx) if tx.phase == TxPhase::Confirmed
    )));

    drop(subscription);
    let count = seen.lock().len();
    h.engine.refresh().await.unwrap();
    assert_eq!(seen.lock().len(), count);
}

#[tokio::test]
async fn live_updates_apply_remote_changes() {
    let h = harness(3);
    h.engine.refresh().await.unwrap();
    let before = h.engine.updates_processed();
    assert!(h.engine.enable_live_updates());
    assert!(h.engine.live_updates_enabled());
    assert_eq!(h.sim.subscriber_count(), 1);

    h.sim.paint_as(RIVAL, Coord::new(2, 1), BLUE).unwrap();
    wait_until(|| h.engine.snapshot()[1][2] == BLUE).await;
    assert_eq!(h.engine.updates_processed(), before + 1);

    assert!(h.engine.disable_live_updates());
    assert!(!h.engine.live_updates_enabled());
    wait_until(|| h.sim.subscriber_count() == 0).await;
}
