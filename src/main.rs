use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use vending::config::{Cli, Command, WatchArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let cmd = cli
        .command
        .clone()
        .unwrap_or(Command::Watch(WatchArgs::default()));

    vending::commands::run(cli.config, cmd).await
}

/// Logs go to stderr so rendered views on stdout stay clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
