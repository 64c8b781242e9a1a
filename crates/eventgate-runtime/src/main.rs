//! eventgate: event source gateway and sensor controller binary.
//! Single process embedding the source manager, the sensor controller and
//! the dispatcher that connects them.

use clap::Parser;

mod cli;
mod config;
mod dispatch;
mod run;
mod status_table;
mod validate_cmd;
mod watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("EVENTGATE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Run(opts) => {
            tracing::info!(config = %opts.config.display(), "eventgate starting");
            run::cmd_run(&opts.config).await?;
        }
        cli::Command::Validate(opts) => {
            validate_cmd::cmd_validate(&opts.source_type, &opts.file).await?;
        }
    }
    Ok(())
}
