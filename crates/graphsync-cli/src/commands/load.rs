//! `load` and `link` commands.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use graphsync_core::file::{read_matchlink_schema, read_node_schema, read_records};
use graphsync_graph::{load_matchlinks_with, load_with, GraphJob, LoadOptions, SyncConfig};
use std::path::PathBuf;

use super::{Backend, ParamArgs, SubResourceArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Node schema file (TOML or JSON)
    pub schema: PathBuf,

    /// JSON array of records
    pub records: PathBuf,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Records per statement (overrides the config file)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Run the schema's stale-data cleanup after loading
    #[arg(long)]
    pub cleanup: bool,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// MatchLink relationship schema file (TOML or JSON)
    pub schema: PathBuf,

    /// JSON array of records
    pub records: PathBuf,

    #[command(flatten)]
    pub sub_resource: SubResourceArgs,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Records per statement (overrides the config file)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Delete this sub-resource's stale edges after linking
    #[arg(long)]
    pub cleanup: bool,
}

fn options(config: &SyncConfig, batch_size: Option<usize>) -> LoadOptions {
    LoadOptions {
        batch_size: batch_size.unwrap_or(config.load.batch_size).max(1),
    }
}

pub async fn execute_load(args: LoadArgs, backend: &Backend, config: &SyncConfig) -> Result<()> {
    let schema = read_node_schema(&args.schema)
        .with_context(|| format!("Failed to read schema {}", args.schema.display()))?;
    let records = read_records(&args.records)
        .with_context(|| format!("Failed to read records {}", args.records.display()))?;
    let params = args.params.resolve()?;

    println!("{} {} ({} records)", "Loading".bold(), schema.label.cyan(), records.len());
    let summary = load_with(
        backend.session(),
        &schema,
        &records,
        &params,
        &options(config, args.batch_size),
    )
    .await?;
    output::print_load_summary(&summary);

    if args.cleanup {
        let job = config.cleanup.apply(GraphJob::from_node_schema(&schema, &params)?);
        let summary = job.run(backend.session()).await?;
        output::print_job_summary(&job.name, &summary);
    }
    Ok(())
}

pub async fn execute_link(args: LinkArgs, backend: &Backend, config: &SyncConfig) -> Result<()> {
    let rel = read_matchlink_schema(&args.schema)
        .with_context(|| format!("Failed to read schema {}", args.schema.display()))?;
    let records = read_records(&args.records)
        .with_context(|| format!("Failed to read records {}", args.records.display()))?;
    let params = args.params.resolve()?;
    let sub_resource = args.sub_resource.sub_resource();

    println!("{} {} ({} records)", "Linking".bold(), rel.describe().cyan(), records.len());
    let summary = load_matchlinks_with(
        backend.session(),
        &rel,
        &records,
        &params,
        &sub_resource,
        &options(config, args.batch_size),
    )
    .await?;
    output::print_load_summary(&summary);

    if args.cleanup {
        let job = config
            .cleanup
            .apply(GraphJob::from_matchlink(&rel, &sub_resource, params.update_tag()?)?);
        let summary = job.run(backend.session()).await?;
        output::print_job_summary(&job.name, &summary);
    }
    Ok(())
}
