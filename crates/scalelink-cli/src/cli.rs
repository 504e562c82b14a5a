//! Command line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use scalelink_core::protocol::ProtocolVariant;

/// scalelink - read weights from serial scales
#[derive(Parser, Debug)]
#[command(
    name = "scalelink",
    version = scalelink_core::VERSION,
    about = "Read weights from legacy and standard serial scales",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List serial ports and the protocol each would be read with
    Ports,

    /// Connect to a scale and print weights until interrupted
    Read(ReadArgs),
}

/// Arguments for `read`
#[derive(Args, Debug, Clone, Default)]
pub struct ReadArgs {
    /// Serial port to open, overriding the config file
    #[arg(short, long)]
    pub port: Option<String>,

    /// Read from a simulated scale instead of hardware
    #[arg(long, value_enum)]
    pub demo: Option<DemoScale>,

    /// Configuration file (defaults to <config dir>/scalelink/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Exit after the first reading
    #[arg(long)]
    pub once: bool,
}

/// Simulated scale kinds
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoScale {
    /// `+NNNNNN` frames at 1200 baud
    Legacy,
    /// Raw digits at 9600 baud
    Standard,
}

impl From<DemoScale> for ProtocolVariant {
    fn from(scale: DemoScale) -> Self {
        match scale {
            DemoScale::Legacy => ProtocolVariant::Legacy,
            DemoScale::Standard => ProtocolVariant::Standard,
        }
    }
}
