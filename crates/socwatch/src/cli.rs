//! Clap derive structures for the `socwatch` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// socwatch -- battery state-of-charge monitor for Sunsynk inverter fleets
#[derive(Debug, Parser)]
#[command(
    name = "socwatch",
    version,
    about = "Monitor battery state of charge across a Sunsynk inverter fleet",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to config/$SOCWATCH_ENV/config.toml)
    #[arg(long, short = 'c', env = "SOCWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the monitoring loop until interrupted
    Run,

    /// Refresh the fleet if due, then run a single cycle
    Once,

    /// Rediscover the fleet and print the validation report
    Discover,

    /// Delete expired data and log files
    Sweep,
}
