//! scalelink command line front-end

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use scalelink_core::config::{ConnectionConfig, CONFIG_FILE_NAME};
use scalelink_core::demo::DemoProvider;
use scalelink_core::protocol::{
    list_ports, ConnectionState, ScaleConnection, SerialPortProvider, WeightReading,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ReadArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Ports => print_ports(),
        Commands::Read(args) => read(args).await,
    }
}

/// Log to stderr so weights on stdout stay clean, `RUST_LOG` overrides `info`
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_ports() -> Result<()> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    for port in ports {
        let description = port
            .product
            .as_deref()
            .or(port.manufacturer.as_deref())
            .unwrap_or("");
        println!(
            "{:<24} {:<10} {:<9} {}",
            port.name,
            port.identity(),
            port.variant(),
            description
        );
    }
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scalelink").join(CONFIG_FILE_NAME))
}

fn load_file(path: &Path) -> Result<ConnectionConfig> {
    ConnectionConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// Resolve the effective config: explicit file, else the default file if it
/// exists, else defaults. Command line flags win over file values.
fn load_config(args: &ReadArgs, default_path: Option<PathBuf>) -> Result<ConnectionConfig> {
    let mut config = match (&args.config, default_path) {
        (Some(path), _) => load_file(path)?,
        (None, Some(path)) if path.exists() => load_file(&path)?,
        _ => ConnectionConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port_name = Some(port.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn read(args: ReadArgs) -> Result<()> {
    let config = load_config(&args, default_config_path())?;
    let mut conn = match args.demo {
        Some(scale) => ScaleConnection::new(DemoProvider::new(scale.into()), config),
        None => ScaleConnection::new(SerialPortProvider::from_config(&config), config),
    };

    let mut states = conn.watch_state();
    let mut weights = conn.watch_weight();
    conn.connect().await.context("failed to connect to scale")?;
    tracing::info!("reading weights, press Ctrl-C to stop");

    let result = follow(&mut states, &mut weights, args.once).await;
    conn.disconnect().await;
    result
}

/// Print state transitions and weights until interrupted or the scale goes away
async fn follow(
    states: &mut watch::Receiver<ConnectionState>,
    weights: &mut watch::Receiver<Option<WeightReading>>,
    once: bool,
) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("interrupted");
                return Ok(());
            }
            changed = weights.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let reading = *weights.borrow_and_update();
                if let Some(reading) = reading {
                    println!("Weight: {} kg", reading.weight);
                    if once {
                        return Ok(());
                    }
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = *states.borrow_and_update();
                println!("State: {:?}", state);
                if state == ConnectionState::Disconnected {
                    bail!("scale disconnected");
                }
            }
        }
    }
}
