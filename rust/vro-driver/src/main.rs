//! vRO Driver - operator CLI
//!
//! Runs single lifecycle operations against the configured orchestrator,
//! persisting machine references as JSON files under a state directory.
//! Results are printed as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vro_driver::config::LoggingConfig;
use vro_driver::{Driver, DriverConfig, JsonFileReferenceStore, MachineOptions};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "vro-driver")]
#[command(about = "Machine lifecycle driver for vRealize Orchestrator")]
#[command(version)]
struct Cli {
    /// Config file path (defaults to config/vro-driver.{yaml,toml,json}).
    #[arg(short, long, env = "VRO_DRIVER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory holding one reference file per machine.
    #[arg(long, env = "VRO_DRIVER_STATE_DIR", default_value = ".vro-driver", global = true)]
    state_dir: PathBuf,

    /// Log level, overriding the configured one. `RUST_LOG` still wins.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit the allocation workflow (never blocks).
    Allocate(MachineArgs),
    /// Wait for allocation, start the VM if needed and print its handle.
    Ready(MachineArgs),
    /// Power the VM on.
    Start(PowerArgs),
    /// Power the VM off.
    Stop(PowerArgs),
    /// Destroy the VM.
    Destroy(PowerArgs),
    /// Print a fresh instance snapshot.
    Info {
        /// Machine name.
        machine: String,
    },
    /// Print the persisted reference.
    Show {
        /// Machine name.
        machine: String,
    },
}

#[derive(clap::Args, Debug)]
struct MachineArgs {
    /// Machine name.
    machine: String,

    /// YAML or JSON file with machine options.
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct PowerArgs {
    #[command(flatten)]
    target: MachineArgs,

    /// Block until the workflow finishes.
    #[arg(long)]
    wait: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DriverConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging, cli.log_level.as_deref());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        driver_url = %config.driver_url(),
        state_dir = %cli.state_dir.display(),
        "Starting vro-driver"
    );

    let store = Arc::new(JsonFileReferenceStore::new(&cli.state_dir));
    let driver = Driver::connect(Arc::new(config), store)?;

    match cli.command {
        Command::Allocate(args) => {
            let options = load_options(args.options.as_deref()).await?;
            print_json(&driver.allocate(&args.machine, &options).await?)
        }
        Command::Ready(args) => {
            let options = load_options(args.options.as_deref()).await?;
            print_json(&driver.ready(&args.machine, &options).await?)
        }
        Command::Start(args) => {
            let options = load_options(args.target.options.as_deref()).await?;
            print_json(&driver.start(&args.target.machine, &options, args.wait).await?)
        }
        Command::Stop(args) => {
            let options = load_options(args.target.options.as_deref()).await?;
            print_json(&driver.stop(&args.target.machine, &options, args.wait).await?)
        }
        Command::Destroy(args) => {
            let options = load_options(args.target.options.as_deref()).await?;
            print_json(&driver.destroy(&args.target.machine, &options, args.wait).await?)
        }
        Command::Info { machine } => print_json(&driver.instance_info(&machine).await?),
        Command::Show { machine } => {
            let reference = driver.reference(&machine).await?;
            print_json(&reference.map(|r| r.to_flat_map()))
        }
    }
}

/// Initialize tracing/logging on stderr.
fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn load_options(path: Option<&Path>) -> anyhow::Result<MachineOptions> {
    let Some(path) = path else {
        return Ok(MachineOptions::default());
    };

    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read options file {}", path.display()))?;
    let options: MachineOptions = serde_yaml::from_str(&text)
        .with_context(|| format!("invalid options file {}", path.display()))?;
    Ok(options)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
