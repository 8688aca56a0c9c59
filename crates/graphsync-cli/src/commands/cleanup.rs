//! `cleanup`, `unlink` and `job` commands.

use anyhow::{Context, Result};
use clap::Args;
use graphsync_core::file::{read_matchlink_schema, read_node_schema};
use graphsync_graph::{GraphJob, SyncConfig};
use std::path::PathBuf;

use super::{Backend, ParamArgs, SubResourceArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Node schema file (TOML or JSON)
    pub schema: PathBuf,

    /// Update tag and tenant parameters of the run being cleaned up
    #[command(flatten)]
    pub params: ParamArgs,
}

#[derive(Args, Debug)]
pub struct UnlinkArgs {
    /// MatchLink relationship schema file (TOML or JSON)
    pub schema: PathBuf,

    #[command(flatten)]
    pub sub_resource: SubResourceArgs,

    /// Update tag of the run being cleaned up
    #[arg(long)]
    pub update_tag: i64,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// JSON job file: {"name", "statements": [{"query", "iterative", "iterationsize"}]}
    pub file: PathBuf,

    #[command(flatten)]
    pub params: ParamArgs,
}

pub async fn execute_cleanup(
    args: CleanupArgs,
    backend: &Backend,
    config: &SyncConfig,
) -> Result<()> {
    let schema = read_node_schema(&args.schema)
        .with_context(|| format!("Failed to read schema {}", args.schema.display()))?;
    let params = args.params.resolve()?;
    let job = config.cleanup.apply(GraphJob::from_node_schema(&schema, &params)?);
    run(job, backend).await
}

pub async fn execute_unlink(
    args: UnlinkArgs,
    backend: &Backend,
    config: &SyncConfig,
) -> Result<()> {
    let rel = read_matchlink_schema(&args.schema)
        .with_context(|| format!("Failed to read schema {}", args.schema.display()))?;
    let sub_resource = args.sub_resource.sub_resource();
    let job = GraphJob::from_matchlink(&rel, &sub_resource, args.update_tag.into())?;
    run(config.cleanup.apply(job), backend).await
}

pub async fn execute_job(args: JobArgs, backend: &Backend, config: &SyncConfig) -> Result<()> {
    let params = args.params.resolve()?;
    let mut job = GraphJob::from_json_file(&args.file, &params)
        .with_context(|| format!("Failed to read job {}", args.file.display()))?;
    // iteration sizes come from the job file
    job = job.with_max_iterations(config.cleanup.max_iterations);
    run(job, backend).await
}

async fn run(job: GraphJob, backend: &Backend) -> Result<()> {
    let summary = job.run(backend.session()).await?;
    output::print_job_summary(&job.name, &summary);
    Ok(())
}
