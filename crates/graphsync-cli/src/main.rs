//! graphsync CLI
//!
//! Loads provider records into Neo4j through declarative schemas and sweeps
//! stale data afterwards.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::Cli;

/// Initialize tracing on stderr so compiled statements on stdout stay clean.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "graphsync=debug,graphsync_graph=debug"
    } else {
        "graphsync=info,graphsync_graph=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.execute().await
}
