//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "eventgate", about = "event source gateway and sensor controller")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway and the sensor controller until interrupted
    Run(RunOpts),
    /// Validate a raw event source config file
    Validate(ValidateOpts),
}

#[derive(clap::Args)]
pub struct RunOpts {
    /// Path to the TOML config file
    #[arg(long, short = 'c', env = "EVENTGATE_CONFIG", default_value = "eventgate.toml")]
    pub config: PathBuf,
}

#[derive(clap::Args)]
pub struct ValidateOpts {
    /// Source type, e.g. file, s3, amqp, nats, mqtt, storagegrid
    #[arg(long = "type", short = 't')]
    pub source_type: String,

    /// File holding the raw config
    pub file: PathBuf,
}
