//! `indexes` command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use graphsync_core::file::{read_matchlink_schema, read_node_schema};
use graphsync_graph::{ensure_indexes, ensure_matchlink_indexes};
use std::path::PathBuf;

use super::Backend;

#[derive(Args, Debug)]
pub struct IndexesArgs {
    /// Schema file (TOML or JSON)
    pub schema: PathBuf,

    /// The schema is a MatchLink relationship schema
    #[arg(long)]
    pub matchlink: bool,
}

pub async fn execute(args: IndexesArgs, backend: &Backend) -> Result<()> {
    let context = || format!("Failed to read schema {}", args.schema.display());
    let count = if args.matchlink {
        let rel = read_matchlink_schema(&args.schema).with_context(context)?;
        ensure_matchlink_indexes(backend.session(), &rel).await?
    } else {
        let schema = read_node_schema(&args.schema).with_context(context)?;
        ensure_indexes(backend.session(), &schema).await?
    };
    println!("{} {} indexes ensured", "✓".green(), count);
    Ok(())
}
