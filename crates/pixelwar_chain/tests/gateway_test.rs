//! # Gateway Tests
//!
//! `ContractGateway` against the simulated PixelBoard:
//!
//! 1. **Reads**: per-row fallback, bounded concurrency, timeouts
//! 2. **Writes**: every failure category, confirmation details
//! 3. **Change feed**: remote placements reach the callback
//!
//! Run with: cargo test -p pixelwar_chain --test gateway_test

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pixelwar_chain::{
    ChainGateway, ContractGateway, GatewayConfig, PixelChange, RowFetch, SimulatedLedger,
};
use pixelwar_core::{
    Address, CanvasError, Coord, GridSize, ManualClock, PartialLoadFailure, Rgb, SubmitFailure,
    Timestamp,
};

const CONTRACT: Address = Address::repeat_byte(0xC0);
const PLAYER: Address = Address::repeat_byte(0x01);
const FALLBACK: Rgb = Rgb::new(0x01, 0x02, 0x03);

fn gateway(width: u32, height: u32) -> (Arc<SimulatedLedger>, ContractGateway<Arc<SimulatedLedger>>) {
    let size = GridSize::new(width, height).unwrap();
    let sim = Arc::new(SimulatedLedger::new(size, CONTRACT));
    let config = GatewayConfig {
        contract: CONTRACT,
        size,
        fallback: FALLBACK,
        fetch_concurrency: 4,
        read_timeout: Duration::from_secs(1),
        write_timeout: Duration::from_secs(5),
    };
    (Arc::clone(&sim), ContractGateway::new(sim, config))
}

// ============================================================================
// READS
// ============================================================================

#[tokio::test]
async fn failed_row_falls_back_without_failing_the_canvas() {
    let (sim, gateway) = gateway(5, 5);
    let red = Rgb::new(0xFF, 0, 0);
    for y in 0..5 {
        sim.paint_as(PLAYER, Coord::new(y, y), red).unwrap();
    }
    sim.fail_rows([2]);

    let fetch = gateway.fetch_all().await.unwrap();
    assert_eq!(fetch.rows.len(), 5);
    assert_eq!(fetch.warning(), Some(PartialLoadFailure::new([2])));

    let grid = fetch.to_grid();
    assert_eq!(grid[2], [FALLBACK; 5]);
    for y in [0usize, 1, 3, 4] {
        assert_eq!(grid[y][y], red);
        assert_eq!(grid[y][(y + 1) % 5], Rgb::BLACK);
    }

    let stats = gateway.stats();
    assert_eq!(stats.row_reads.load(std::sync::atomic::Ordering::Relaxed), 5);
    assert_eq!(stats.row_failures.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn every_row_failing_is_an_error() {
    let (sim, gateway) = gateway(3, 3);
    sim.set_unreachable(true);

    let result = gateway.fetch_all().await;
    assert!(matches!(result, Err(CanvasError::RemoteUnavailable(_))));
}

#[tokio::test(start_paused = true)]
async fn slow_row_times_out_into_fallback() {
    let (sim, gateway) = gateway(2, 2);
    sim.set_latency(Duration::from_secs(10));

    let row = gateway.fetch_row(1).await;
    match row {
        RowFetch::Failed { y, colors, reason } => {
            assert_eq!(y, 1);
            assert_eq!(colors, vec![FALLBACK; 2]);
            assert!(reason.contains("timed out"), "{reason}");
        }
        RowFetch::Loaded { .. } => panic!("row should have timed out"),
    }

    assert_eq!(
        gateway.fetch_pixel(Coord::new(0, 0)).await,
        Err(CanvasError::NetworkTimeout)
    );
}

#[tokio::test(start_paused = true)]
async fn row_reads_respect_the_concurrency_bound() {
    let size = GridSize::new(2, 8).unwrap();
    let sim = Arc::new(SimulatedLedger::new(size, CONTRACT));
    sim.set_latency(Duration::from_millis(100));
    let gateway = ContractGateway::new(
        Arc::clone(&sim),
        GatewayConfig {
            contract: CONTRACT,
            size,
            fallback: FALLBACK,
            fetch_concurrency: 2,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        },
    );

    let started = tokio::time::Instant::now();
    let fetch = gateway.fetch_all().await.unwrap();
    let elapsed = started.elapsed();

    assert!(fetch.warning().is_none());
    // 8 rows, 2 at a time, 100ms each.
    assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");
}

#[tokio::test]
async fn pixel_read_outside_canvas_makes_no_call() {
    let (sim, gateway) = gateway(3, 3);

    let result = gateway.fetch_pixel(Coord::new(3, 0)).await;
    assert!(matches!(result, Err(CanvasError::CoordinateOutOfBounds { .. })));
    assert_eq!(sim.total_requests(), 0);
}

// ============================================================================
// WRITES
// ============================================================================

#[tokio::test]
async fn confirmed_submission_is_readable() {
    let size = GridSize::new(3, 3).unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
    let sim = Arc::new(SimulatedLedger::new(size, CONTRACT).with_clock(clock));
    let gateway = ContractGateway::new(
        Arc::clone(&sim),
        GatewayConfig {
            contract: CONTRACT,
            size,
            fallback: FALLBACK,
            fetch_concurrency: 1,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        },
    );
    let blue = Rgb::new(0, 0, 0xFF);

    let confirmation = gateway
        .submit_pixel(PLAYER, Coord::new(1, 2), blue)
        .await
        .unwrap();
    assert_eq!(confirmation.color, blue);
    assert_eq!(confirmation.confirmed_at, Some(Timestamp::from_secs(1_700_000_000)));

    let read = gateway.fetch_pixel(Coord::new(1, 2)).await.unwrap();
    assert_eq!(read.color, blue);
    assert_eq!(read.last_changed, Some(Timestamp::from_secs(1_700_000_000)));
}

#[tokio::test]
async fn submission_failures_are_categorized() {
    let (sim, gateway) = gateway(3, 3);
    let coord = Coord::new(0, 0);

    sim.reject_next_submission();
    assert_eq!(
        gateway.submit_pixel(PLAYER, coord, Rgb::WHITE).await,
        Err(SubmitFailure::RejectedByUser)
    );

    sim.revert_next_submission("cooldown active");
    assert_eq!(
        gateway.submit_pixel(PLAYER, coord, Rgb::WHITE).await,
        Err(SubmitFailure::Reverted("cooldown active".to_string()))
    );

    sim.set_unreachable(true);
    assert!(matches!(
        gateway.submit_pixel(PLAYER, coord, Rgb::WHITE).await,
        Err(SubmitFailure::RemoteUnavailable(_))
    ));

    assert_eq!(sim.pixel(coord), Some(Rgb::BLACK));
    let stats = gateway.stats();
    assert_eq!(stats.submissions.load(std::sync::atomic::Ordering::Relaxed), 3);
    assert_eq!(stats.submission_failures.load(std::sync::atomic::Ordering::Relaxed), 3);
}

#[tokio::test(start_paused = true)]
async fn unsettled_submission_times_out() {
    let (sim, gateway) = gateway(3, 3);
    sim.hold_submissions();

    assert_eq!(
        gateway.submit_pixel(PLAYER, Coord::new(2, 2), Rgb::WHITE).await,
        Err(SubmitFailure::NetworkTimeout)
    );
}

// ============================================================================
// CHANGE FEED
// ============================================================================

#[tokio::test]
async fn remote_changes_reach_the_callback() {
    let (sim, gateway) = gateway(4, 4);
    let (tx, rx) = crossbeam_channel::unbounded::<PixelChange>();

    let subscription = gateway
        .subscribe_to_changes(Box::new(move |change| {
            let _ = tx.send(change);
        }))
        .unwrap();

    let other = Address::repeat_byte(0x77);
    let sent = sim.paint_as(other, Coord::new(3, 1), Rgb::WHITE).unwrap();

    let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(received, sent);
    assert_eq!(received.who, other);

    subscription.unsubscribe();
    assert_eq!(sim.subscriber_count(), 0);
}
