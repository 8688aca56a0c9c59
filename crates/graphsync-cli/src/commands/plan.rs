//! `plan` command: show what a load or cleanup would send.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use graphsync_core::file::{read_matchlink_schema, read_node_schema, read_records};
use graphsync_core::{Record, SubResource};
use graphsync_graph::query::{
    build_index_plans, build_matchlink_index_plans, compile_matchlink_ingestion,
    compile_node_ingestion, IngestionPlan,
};
use graphsync_graph::{GraphJob, Plan, Statement};
use serde_json::Value;
use std::path::PathBuf;

use super::{parse_value, ParamArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Schema file (TOML or JSON)
    pub schema: PathBuf,

    /// JSON array of records; without it the statement templates are shown
    pub records: Option<PathBuf>,

    /// The schema is a MatchLink relationship schema
    #[arg(long)]
    pub matchlink: bool,

    /// Label of the tenant node (MatchLinks)
    #[arg(long)]
    pub sub_resource_label: Option<String>,

    /// Id of the tenant node (MatchLinks)
    #[arg(long, value_parser = parse_value)]
    pub sub_resource_id: Option<Value>,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Records per statement
    #[arg(long, default_value_t = graphsync_graph::load::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Also show cleanup statements
    #[arg(long)]
    pub cleanup: bool,

    /// Also show index statements
    #[arg(long)]
    pub indexes: bool,
}

impl PlanArgs {
    fn sub_resource(&self) -> Result<SubResource> {
        match (&self.sub_resource_label, &self.sub_resource_id) {
            (Some(label), Some(id)) => Ok(SubResource::new(label.clone(), id.clone())),
            _ => Err(anyhow!("MatchLinks need --sub-resource-label and --sub-resource-id")),
        }
    }
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let params = args.params.resolve()?;
    let records: Option<Vec<Record>> = match &args.records {
        Some(path) => Some(
            read_records(path)
                .with_context(|| format!("Failed to read records {}", path.display()))?,
        ),
        None => None,
    };
    let context = || format!("Failed to read schema {}", args.schema.display());

    let mut statements = Vec::new();
    if args.matchlink {
        let rel = read_matchlink_schema(&args.schema).with_context(context)?;
        let sub_resource = args.sub_resource()?;
        let plan = compile_matchlink_ingestion(&rel, &params, &sub_resource)?;
        statements.extend(ingestion_statements(&plan, records.as_deref(), args.batch_size)?);
        if args.cleanup {
            let job = GraphJob::from_matchlink(&rel, &sub_resource, params.update_tag()?)?;
            statements.extend(job.statements.into_iter().map(|s| s.statement));
        }
        if args.indexes {
            statements.extend(build_matchlink_index_plans(&rel).into_iter().map(Statement::new));
        }
    } else {
        let schema = read_node_schema(&args.schema).with_context(context)?;
        let plan = compile_node_ingestion(&schema, &params)?;
        statements.extend(ingestion_statements(&plan, records.as_deref(), args.batch_size)?);
        if args.cleanup {
            let job = GraphJob::from_node_schema(&schema, &params)?;
            statements.extend(job.statements.into_iter().map(|s| s.statement));
        }
        if args.indexes {
            statements.extend(build_index_plans(&schema).into_iter().map(Statement::new));
        }
    }

    let show_params = records.is_some();
    for (index, statement) in statements.iter().enumerate() {
        output::print_statement(index + 1, statement, show_params);
    }
    Ok(())
}

/// Full statements when records are given, templates otherwise.
fn ingestion_statements(
    plan: &IngestionPlan,
    records: Option<&[Record]>,
    batch_size: usize,
) -> Result<Vec<Statement>> {
    if let Some(records) = records {
        return Ok(plan.statements(records, batch_size.max(1))?);
    }
    let mut templates: Vec<Statement> = plan
        .node_plan()
        .map(|node| Statement::new(Plan::MergeNodes(node.clone())))
        .into_iter()
        .collect();
    templates.extend(
        plan.relationship_plans()
            .iter()
            .map(|rel| Statement::new(Plan::MergeRelationships(rel.clone()))),
    );
    Ok(templates)
}
