//! # PIXELWAR CLI
//!
//! Talks to a deployed PixelBoard contract over JSON-RPC.
//!
//! ```bash
//! # Print the canvas
//! pixelwar --network baseSepolia show
//!
//! # Place a pixel (the node must hold the account's key)
//! pixelwar --rpc http://127.0.0.1:8545 --account 0x.. place 3 4 '#ff0000'
//!
//! # Follow changes until Ctrl+C
//! pixelwar --config pixelwar.toml watch
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use pixelwar_chain::{ContractGateway, Endpoint, GatewayConfig, RpcLedger};
use pixelwar_core::{Address, CanvasError, CanvasResult, SessionAccount, SyncConfig, SystemClock};
use pixelwar_sync::{logging, render, CanvasEvent, EngineOptions, SyncEngine};

type Engine = SyncEngine<ContractGateway<RpcLedger>>;

enum Command {
    Show,
    Pixel(i64, i64),
    Place(i64, i64, String),
    Watch,
}

struct Args {
    config: Option<String>,
    network: Option<String>,
    rpc: Option<String>,
    account: Option<Address>,
    plain: bool,
    command: Command,
}

fn usage() {
    println!("Usage: pixelwar [options] <command>");
    println!();
    println!("Options:");
    println!("  --config <file>     TOML configuration");
    println!("  --network <name>    baseSepolia | base | celoSepolia | celo");
    println!("  --rpc <url>         Override the network's RPC endpoint");
    println!("  --account <0x..>    Account used for placements");
    println!("  --plain             Print colors as hex instead of blocks");
    println!();
    println!("Commands:");
    println!("  show                Load and print the canvas");
    println!("  pixel <x> <y>       Read one pixel");
    println!("  place <x> <y> <c>   Place color <c> (#rrggbb) at (x, y)");
    println!("  watch               Print remote changes until Ctrl+C");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut config = None;
    let mut network = None;
    let mut rpc = None;
    let mut account = None;
    let mut plain = false;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "--network" | "--rpc" | "--account" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("{} needs a value", args[i]))?
                    .clone();
                match args[i].as_str() {
                    "--config" => config = Some(value),
                    "--network" => network = Some(value),
                    "--rpc" => rpc = Some(value),
                    _ => {
                        let address = value
                            .parse::<Address>()
                            .map_err(|e| format!("invalid account {value}: {e}"))?;
                        account = Some(address);
                    }
                }
                i += 1;
            }
            "--plain" => plain = true,
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let coord = |at: usize| -> Result<i64, String> {
        let text = positional.get(at).ok_or("missing coordinate")?;
        text.parse().map_err(|_| format!("invalid coordinate: {text}"))
    };

    let command = match positional.first().map(String::as_str) {
        Some("show") | None => Command::Show,
        Some("pixel") => Command::Pixel(coord(1)?, coord(2)?),
        Some("place") => {
            let color = positional.get(3).ok_or("missing color")?.clone();
            Command::Place(coord(1)?, coord(2)?, color)
        }
        Some("watch") => Command::Watch,
        Some(other) => return Err(format!("unknown command: {other}")),
    };

    Ok(Args {
        config,
        network,
        rpc,
        account,
        plain,
        command,
    })
}

fn build(args: &Args) -> CanvasResult<(Engine, Endpoint)> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(network) = &args.network {
        config.network.clone_from(network);
    }
    if let Some(rpc) = &args.rpc {
        config.rpc_url = Some(rpc.clone());
    }
    config.validate()?;

    let endpoint = Endpoint::resolve(&config)?;
    let ledger = RpcLedger::new(endpoint.rpc_url.clone())
        .map_err(|e| CanvasError::RemoteUnavailable(e.to_string()))?;
    let gateway = ContractGateway::new(ledger, GatewayConfig::from_sync_config(&config, endpoint.contract)?);

    let account = match args.account {
        Some(address) => SessionAccount::connected(address),
        None => SessionAccount::disconnected(),
    };

    let engine = SyncEngine::new(
        gateway,
        Arc::new(account),
        Arc::new(SystemClock),
        EngineOptions::from_config(&config),
    );
    Ok((engine, endpoint))
}

async fn show(engine: &Engine, plain: bool) -> CanvasResult<()> {
    let report = engine.refresh().await?;
    if plain {
        println!("{}", render::plain(&report.grid));
    } else {
        print!("{}", render::ansi(&report.grid));
    }
    if let Some(warning) = report.warning {
        println!();
        println!("   ⚠ {warning}");
    }
    Ok(())
}

async fn run(engine: &Engine, endpoint: &Endpoint, args: &Args) -> CanvasResult<()> {
    match &args.command {
        Command::Show => show(engine, args.plain).await,
        Command::Pixel(x, y) => {
            let pixel = engine.refresh_pixel(*x, *y).await?;
            println!("   ({x}, {y}) = {}", pixel.confirmed);
            Ok(())
        }
        Command::Place(x, y, color) => {
            engine.refresh().await?;
            let confirmation = engine.place(*x, *y, color).await?;
            let tx = format!("{:?}", confirmation.tx_hash);
            println!("   ✓ Pixel placed at ({x}, {y}) in block {}", confirmation.block_number);
            println!("     {}", endpoint.network.tx_url(&tx));

            let cooldown = engine.get_cooldown_status();
            println!("     Next placement in {} seconds", cooldown.remaining_secs());
            Ok(())
        }
        Command::Watch => {
            show(engine, args.plain).await?;
            let _events = engine.subscribe(|event| match event {
                CanvasEvent::GridChanged(coords) => {
                    for coord in coords {
                        println!("   • ({}, {}) changed", coord.x, coord.y);
                    }
                }
                CanvasEvent::Notice(notice) => println!("   » {notice}"),
                _ => {}
            });
            if !engine.enable_live_updates() {
                return Err(CanvasError::RemoteUnavailable(
                    "no change feed available".to_string(),
                ));
            }

            println!();
            println!("   Watching for changes... (Press Ctrl+C to stop)");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c handler failed");
            }
            engine.disable_live_updates();
            println!("   {} remote updates applied", engine.updates_processed());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().collect();
    if raw.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return ExitCode::SUCCESS;
    }
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("   ✗ {e}");
            eprintln!();
            usage();
            return ExitCode::from(2);
        }
    };

    logging::init("warn");

    let (engine, endpoint) = match build(&args) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("   ✗ FATAL: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                         PIXELWAR");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();
    println!("  Network:  {} (chain {})", endpoint.network.display_name, endpoint.network.chain_id);
    println!("  RPC:      {}", endpoint.rpc_url);
    println!("  Contract: {}", endpoint.contract);
    match args.account {
        Some(account) => println!("  Account:  {account}"),
        None => println!("  Account:  not connected"),
    }
    println!();

    match run(&engine, &endpoint, &args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("   ✗ {e}");
            if let Some(notice) = engine.notice() {
                eprintln!("     {notice}");
            }
            ExitCode::FAILURE
        }
    }
}
