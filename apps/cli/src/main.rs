//! hybridci CLI: config marketplace and webhook tooling for the Hybrid CI/CD platform.
//!
//! Runs contribution manifests through the config discovery chain, browses
//! the marketplace (mock or GitHub-imported), and replays webhook events.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
