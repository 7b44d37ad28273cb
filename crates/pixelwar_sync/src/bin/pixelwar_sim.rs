//! # PIXELWAR Simulation
//!
//! Runs the sync engine against the in-memory ledger with faults injected,
//! so the whole flow can be watched without a node.
//!
//! ```bash
//! pixelwar_sim                 # 30x30, row 2 unreadable
//! pixelwar_sim --size 12 --fail-row 5 --plain
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use pixelwar_chain::{ContractGateway, GatewayConfig, SimulatedLedger};
use pixelwar_core::{
    Address, CanvasError, CanvasResult, Coord, Grid, Rgb, SessionAccount, SyncConfig, SystemClock,
    PALETTE,
};
use pixelwar_sync::{logging, render, CanvasEvent, EngineOptions, SyncEngine};

const CONTRACT: Address = Address::new([0xC0; 20]);
const PLAYER: Address = Address::new([0x01; 20]);
const RIVAL: Address = Address::new([0x02; 20]);

struct Options {
    size: u32,
    fail_row: u32,
    plain: bool,
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        size: 30,
        fail_row: 2,
        plain: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--size" | "-s" => {
                if i + 1 < args.len() {
                    options.size = args[i + 1].parse().unwrap_or(30);
                    i += 1;
                }
            }
            "--fail-row" => {
                if i + 1 < args.len() {
                    options.fail_row = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--plain" => options.plain = true,
            _ => {}
        }
        i += 1;
    }
    options
}

fn print_grid(grid: &Grid, plain: bool) {
    if plain {
        println!("{}", render::plain(grid));
    } else {
        print!("{}", render::ansi(grid));
    }
}

/// A diagonal of palette colors so rows are easy to tell apart.
fn seed(ledger: &SimulatedLedger, size: u32) -> CanvasResult<()> {
    for i in 0..size {
        let color = PALETTE[i as usize % PALETTE.len()];
        ledger
            .paint_as(RIVAL, Coord::new(i, i), color)
            .map_err(|e| CanvasError::RemoteUnavailable(e.to_string()))?;
    }
    Ok(())
}

async fn run(options: &Options) -> CanvasResult<()> {
    let config = SyncConfig {
        width: options.size,
        height: options.size,
        ..SyncConfig::default()
    };
    config.validate()?;
    let size = config.grid_size()?;

    let ledger = Arc::new(SimulatedLedger::new(size, CONTRACT).with_cooldown(config.cooldown()));
    seed(&ledger, options.size)?;
    ledger.fail_rows([options.fail_row]);

    let gateway = ContractGateway::new(
        Arc::clone(&ledger),
        GatewayConfig::from_sync_config(&config, CONTRACT)?,
    );
    let engine = SyncEngine::new(
        gateway,
        Arc::new(SessionAccount::connected(PLAYER)),
        Arc::new(SystemClock),
        EngineOptions::from_config(&config),
    );
    let _events = engine.subscribe(|event| match event {
        CanvasEvent::StateChanged(state) => println!("   · state: {state}"),
        CanvasEvent::Notice(notice) => println!("   » {notice}"),
        _ => {}
    });

    // === LOAD WITH A BROKEN ROW ===
    println!();
    println!(
        "🏗️  Loading {}x{} canvas (row {} unreadable)...",
        size.width(),
        size.height(),
        options.fail_row
    );
    let report = engine.refresh().await?;
    print_grid(&report.grid, options.plain);
    if let Some(warning) = &report.warning {
        println!("   ⚠ {warning}");
    }

    // === PLACE ===
    let center = i64::from(options.size / 2);
    println!();
    println!("🎨 Placing #ff0000 at ({center}, {center})...");
    let confirmation = engine.place(center, center, "#ff0000").await?;
    println!(
        "   ✓ Confirmed in block {} as {}",
        confirmation.block_number, confirmation.color
    );

    println!();
    println!("🎨 Placing again right away...");
    match engine.place(center + 1, center, "#00ff00").await {
        Ok(_) => println!("   ✗ Cooldown was not enforced"),
        Err(e) => println!("   ✓ Refused: {e}"),
    }
    println!(
        "   Cooldown: {} seconds left",
        engine.get_cooldown_status().remaining_secs()
    );

    // === LIVE FEED ===
    println!();
    println!("📡 Live updates: {}", engine.enable_live_updates());
    let corner = Coord::new(size.width() - 1, 0);
    ledger
        .paint_as(RIVAL, corner, Rgb::new(0x00, 0x80, 0xFF))
        .map_err(|e| CanvasError::RemoteUnavailable(e.to_string()))?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "   Rival painted ({}, {}); local copy shows {}",
        corner.x,
        corner.y,
        engine.snapshot()[corner.y as usize][corner.x as usize]
    );
    engine.disable_live_updates();

    // === HEAL AND RELOAD ===
    println!();
    println!("🔧 Row {} healed, reloading...", options.fail_row);
    ledger.heal_rows();
    let report = engine.refresh().await?;
    print_grid(&report.grid, options.plain);
    println!();
    println!(
        "   Ledger requests: {}   Remote updates applied: {}",
        ledger.total_requests(),
        engine.updates_processed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("warn");
    let options = parse_args();

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    PIXELWAR SIMULATION");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("  Ledger:   in-memory ✓");
    println!("  Player:   {PLAYER}");
    println!("  Rival:    {RIVAL}");

    match run(&options).await {
        Ok(()) => {
            println!();
            println!("═══════════════════════════════════════════════════════════════════");
            println!("                    SIMULATION COMPLETE");
            println!("═══════════════════════════════════════════════════════════════════");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            ExitCode::FAILURE
        }
    }
}
