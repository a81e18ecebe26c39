//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "synchron")]
#[command(author, version, about = "Blade node: protocol engine, flash staging and slice timing", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level requested with `-v`, if any
    pub fn log_level(&self) -> Option<log::LevelFilter> {
        match self.verbose {
            0 => None,
            1 => Some(log::LevelFilter::Debug),
            _ => Some(log::LevelFilter::Trace),
        }
    }
}

/// Where the host is
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct LinkArgs {
    /// Serial device the host is attached to (e.g. /dev/ttyUSB0)
    #[arg(long)]
    pub serial: Option<String>,

    /// Listen for the host on a TCP address (e.g. 127.0.0.1:7777)
    #[arg(long)]
    pub listen: Option<String>,

    /// Connect out to a host bridge on a TCP address
    #[arg(long)]
    pub connect: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the node against an emulated flash chip and a simulated rotor
    Run {
        #[command(flatten)]
        link: LinkArgs,

        /// Serial baud rate (overrides the configuration file)
        #[arg(long)]
        baud: Option<u32>,

        /// Simulated rotor speed (overrides the configuration file)
        #[arg(long)]
        rpm: Option<f32>,

        /// Node configuration file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Node configuration file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
