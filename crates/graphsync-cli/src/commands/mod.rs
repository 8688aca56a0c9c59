//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use graphsync_core::file::read_params;
use graphsync_core::{Params, SubResource, UpdateTag, LASTUPDATED};
use graphsync_graph::{GraphClient, GraphSession, MemoryGraph, SyncConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub mod cleanup;
pub mod indexes;
pub mod load;
pub mod plan;
pub mod status;

const DEFAULT_CONFIG_FILE: &str = "graphsync.toml";

/// Schema-driven graph loads and stale-data cleanup
#[derive(Parser)]
#[command(name = "graphsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./graphsync.toml when present)
    #[arg(short, long, global = true, env = "GRAPHSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run against an empty in-memory graph instead of Neo4j
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upsert records as nodes of a schema
    Load(load::LoadArgs),

    /// Connect existing nodes with a MatchLink schema
    Link(load::LinkArgs),

    /// Delete nodes and edges of a schema the current run did not touch
    Cleanup(cleanup::CleanupArgs),

    /// Delete stale MatchLink edges of one sub-resource
    Unlink(cleanup::UnlinkArgs),

    /// Run a JSON cleanup or analysis job
    Job(cleanup::JobArgs),

    /// Create the indexes a schema relies on
    Indexes(indexes::IndexesArgs),

    /// Print compiled statements without touching a database
    Plan(plan::PlanArgs),

    /// Show node and relationship counts
    Status,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let command = match self.command {
            Commands::Plan(args) => return plan::execute(args),
            command => command,
        };

        let config = load_config(self.config.as_deref())?;
        let backend = Backend::open(&config, self.dry_run).await?;

        match command {
            Commands::Load(args) => load::execute_load(args, &backend, &config).await,
            Commands::Link(args) => load::execute_link(args, &backend, &config).await,
            Commands::Cleanup(args) => cleanup::execute_cleanup(args, &backend, &config).await,
            Commands::Unlink(args) => cleanup::execute_unlink(args, &backend, &config).await,
            Commands::Job(args) => cleanup::execute_job(args, &backend, &config).await,
            Commands::Indexes(args) => indexes::execute(args, &backend).await,
            Commands::Status => status::execute(&backend).await,
            Commands::Plan(args) => plan::execute(args),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::from_path(path)
            .with_context(|| format!("Failed to read config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            SyncConfig::from_path(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("Failed to read config {DEFAULT_CONFIG_FILE}"))
        }
        None => Ok(SyncConfig::from_env()?),
    }
}

/// Where statements run.
pub enum Backend {
    Neo4j(GraphClient),
    Memory(MemoryGraph),
}

impl Backend {
    async fn open(config: &SyncConfig, dry_run: bool) -> Result<Self> {
        if dry_run {
            return Ok(Self::Memory(MemoryGraph::new()));
        }
        let client = GraphClient::connect(&config.neo4j)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", config.neo4j.uri))?;
        Ok(Self::Neo4j(client))
    }

    pub fn session(&self) -> &dyn GraphSession {
        match self {
            Self::Neo4j(client) => client,
            Self::Memory(graph) => graph,
        }
    }
}

/// Batch parameter flags shared by load and cleanup commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Batch parameters file (JSON or TOML)
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Batch parameter, e.g. --param TENANT_ID=t1 (values parse as JSON when possible)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub param: Vec<(String, Value)>,

    /// Update tag of this run (defaults to the current time)
    #[arg(long)]
    pub update_tag: Option<i64>,
}

impl ParamArgs {
    pub fn resolve(&self) -> Result<Params> {
        let mut params = match &self.params {
            Some(path) => read_params(path)
                .with_context(|| format!("Failed to read parameters {}", path.display()))?,
            None => Params::new(UpdateTag::now()),
        };
        if let Some(tag) = self.update_tag {
            params.insert(LASTUPDATED, UpdateTag::new(tag));
        } else if !params.contains(LASTUPDATED) {
            params.insert(LASTUPDATED, UpdateTag::now());
        }
        for (name, value) in &self.param {
            params.insert(name.clone(), value.clone());
        }
        Ok(params)
    }
}

/// The tenant a MatchLink command is scoped to.
#[derive(Args, Debug, Clone)]
pub struct SubResourceArgs {
    /// Label of the tenant node, e.g. AWSAccount
    #[arg(long)]
    pub sub_resource_label: String,

    /// Id of the tenant node
    #[arg(long, value_parser = parse_value)]
    pub sub_resource_id: Value,
}

impl SubResourceArgs {
    pub fn sub_resource(&self) -> SubResource {
        SubResource::new(self.sub_resource_label.clone(), self.sub_resource_id.clone())
    }
}

/// JSON when it parses, otherwise the raw string.
fn parse_value(raw: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((name.to_string(), parse_value(value)?))
}
