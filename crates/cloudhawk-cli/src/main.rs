//! CloudHawk CLI - command-line control for CloudHawk mowers
//!
//! Connects to a mower over BLE and exposes the client's upward API:
//! state snapshots, a change stream, and the control commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cloudhawk_ble::{Command as MowerCommand, CommandOutcome, MowerClient, MowerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cloudhawk")]
#[command(author, version, about = "CloudHawk mower control over BLE")]
#[command(propagate_version = true)]
struct Cli {
    /// Peripheral address, e.g. "AA:BB:CC:DD:EE:FF"
    #[arg(short, long, env = "CLOUDHAWK_ADDRESS")]
    address: Option<String>,

    /// Advertised-name fragment (the mowers advertise their serial number)
    #[arg(short = 'n', long, env = "CLOUDHAWK_NAME")]
    device_name: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "CLOUDHAWK_CONFIG")]
    config: Option<PathBuf>,

    /// How long to wait for the link to come up, in seconds
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, let the snapshot populate, and print it as JSON
    Status,
    /// Stream state changes until interrupted
    Monitor,
    /// Start the regular mowing program
    Start,
    /// Mow once, outside the schedule
    StartOnce,
    /// Stop the mower
    Stop,
    /// Send the mower back to the charging dock
    Dock,
    /// Spiral cutting pattern
    Spiral,
    /// Edge cut along the boundary wire
    Edge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let client = MowerClient::new(config);
    client.start();

    let result = run(&cli, &client).await;
    client.stop().await;
    result
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "cloudhawk_ble=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn load_config(cli: &Cli) -> Result<MowerConfig> {
    if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return MowerConfig::from_toml(&text).context("parsing configuration");
    }
    if cli.address.is_none() && cli.device_name.is_none() {
        bail!("pass --address, --device-name, or --config");
    }
    Ok(MowerConfig::for_device(
        cli.address.clone(),
        cli.device_name.clone(),
    ))
}

async fn run(cli: &Cli, client: &MowerClient) -> Result<()> {
    let timeout = Duration::from_secs(cli.connect_timeout);
    if !client.wait_until_ready(timeout).await {
        bail!("no mower link within {}s", cli.connect_timeout);
    }

    match cli.command {
        Commands::Status => status(client).await,
        Commands::Monitor => monitor(client).await,
        Commands::Start => submit(client, MowerCommand::StartMowing).await,
        Commands::StartOnce => submit(client, MowerCommand::StartOnce).await,
        Commands::Stop => submit(client, MowerCommand::Stop).await,
        Commands::Dock => submit(client, MowerCommand::Dock).await,
        Commands::Spiral => submit(client, MowerCommand::SpiralCut).await,
        Commands::Edge => submit(client, MowerCommand::EdgeCut).await,
    }
}

async fn status(client: &MowerClient) -> Result<()> {
    // Give the startup query burst a moment to fill the snapshot in.
    let mut changes = client.changes();
    let settle = tokio::time::timeout(Duration::from_secs(10), async {
        while changes.recv().await.is_ok() {
            if client.snapshot().battery_percent.is_some() {
                break;
            }
        }
    });
    let _ = settle.await;

    println!("{}", serde_json::to_string_pretty(&client.snapshot())?);
    Ok(())
}

async fn monitor(client: &MowerClient) -> Result<()> {
    let mut changes = client.changes();
    eprintln!("monitoring; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) => {
                    println!(
                        "changed {:?} -> {}",
                        change.changed,
                        serde_json::to_string(&client.snapshot())?
                    );
                }
                Err(_) => break,
            }
        }
    }
    Ok(())
}

async fn submit(client: &MowerClient, command: MowerCommand) -> Result<()> {
    match client.submit(command).await? {
        CommandOutcome::Confirmed => println!("confirmed"),
        CommandOutcome::Unacknowledged => {
            println!("sent, but no confirming state change observed; not retrying")
        }
    }
    Ok(())
}
