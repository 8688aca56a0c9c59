//! Entry points provider modules call to write records into the graph.

use graphsync_core::{NodeSchema, Params, Record, RelSchema, SubResource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GraphResult;
use crate::plan::{Plan, Statement};
use crate::query::{
    build_index_plans, build_matchlink_index_plans, compile_matchlink_ingestion,
    compile_node_ingestion, IngestionPlan,
};
use crate::session::GraphSession;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Records per statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Counts reported by the store for one load call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub nodes_merged: u64,
    pub relationships_merged: u64,
    pub statements: usize,
}

impl LoadSummary {
    pub fn merge(&mut self, other: &LoadSummary) {
        self.nodes_merged += other.nodes_merged;
        self.relationships_merged += other.relationships_merged;
        self.statements += other.statements;
    }
}

/// Upsert `records` as nodes of `schema`, plus their relationships.
pub async fn load(
    session: &dyn GraphSession,
    schema: &NodeSchema,
    records: &[Record],
    params: &Params,
) -> GraphResult<LoadSummary> {
    load_with(session, schema, records, params, &LoadOptions::default()).await
}

pub async fn load_with(
    session: &dyn GraphSession,
    schema: &NodeSchema,
    records: &[Record],
    params: &Params,
    options: &LoadOptions,
) -> GraphResult<LoadSummary> {
    let plan = compile_node_ingestion(schema, params)?;
    execute(session, &plan, records, options).await
}

/// Connect existing nodes with the relationships a MatchLink schema describes.
pub async fn load_matchlinks(
    session: &dyn GraphSession,
    rel: &RelSchema,
    records: &[Record],
    params: &Params,
    sub_resource: &SubResource,
) -> GraphResult<LoadSummary> {
    load_matchlinks_with(session, rel, records, params, sub_resource, &LoadOptions::default()).await
}

pub async fn load_matchlinks_with(
    session: &dyn GraphSession,
    rel: &RelSchema,
    records: &[Record],
    params: &Params,
    sub_resource: &SubResource,
    options: &LoadOptions,
) -> GraphResult<LoadSummary> {
    let plan = compile_matchlink_ingestion(rel, params, sub_resource)?;
    execute(session, &plan, records, options).await
}

async fn execute(
    session: &dyn GraphSession,
    plan: &IngestionPlan,
    records: &[Record],
    options: &LoadOptions,
) -> GraphResult<LoadSummary> {
    if records.is_empty() {
        debug!(schema = plan.name(), "No records to load");
        return Ok(LoadSummary::default());
    }

    let statements = plan.statements(records, options.batch_size)?;
    let counts = session.run_all(&statements).await?;

    let mut summary = LoadSummary {
        statements: statements.len(),
        ..Default::default()
    };
    for (statement, affected) in statements.iter().zip(counts) {
        debug!(kind = statement.plan.kind(), affected, "Statement complete");
        match statement.plan {
            Plan::MergeNodes(_) => summary.nodes_merged += affected,
            Plan::MergeRelationships(_) => summary.relationships_merged += affected,
            _ => {}
        }
    }

    info!(
        schema = plan.name(),
        records = records.len(),
        nodes = summary.nodes_merged,
        rels = summary.relationships_merged,
        "Load complete"
    );
    Ok(summary)
}

/// Create the indexes a node schema relies on. Safe to run repeatedly.
pub async fn ensure_indexes(session: &dyn GraphSession, schema: &NodeSchema) -> GraphResult<usize> {
    run_indexes(session, build_index_plans(schema)).await
}

pub async fn ensure_matchlink_indexes(
    session: &dyn GraphSession,
    rel: &RelSchema,
) -> GraphResult<usize> {
    run_indexes(session, build_matchlink_index_plans(rel)).await
}

async fn run_indexes(session: &dyn GraphSession, plans: Vec<Plan>) -> GraphResult<usize> {
    let count = plans.len();
    for plan in plans {
        session.run(&Statement::new(plan)).await?;
    }
    info!(count, "Indexes ensured");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraph;
    use graphsync_core::{Direction, PropertyRef, SchemaError, UpdateTag};
    use serde_json::json;

    fn records(value: serde_json::Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn user_schema() -> NodeSchema {
        NodeSchema::new("User")
            .property("id", PropertyRef::record("id"))
            .property("name", PropertyRef::record("name"))
            .relationship(
                RelSchema::new("MEMBER_OF", "Group", Direction::Outward)
                    .match_target("id", PropertyRef::record("group_id")),
            )
            .unscoped()
    }

    #[tokio::test]
    async fn test_empty_records_touch_nothing() {
        let graph = MemoryGraph::new();
        let summary = load(&graph, &user_schema(), &[], &Params::new(UpdateTag::new(1)))
            .await
            .unwrap();
        assert_eq!(summary, LoadSummary::default());
        assert_eq!(graph.node_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_records_still_validate_schema() {
        let graph = MemoryGraph::new();
        let bad = NodeSchema::new("NoId").property("name", PropertyRef::record("name"));
        let err = load(&graph, &bad, &[], &Params::new(UpdateTag::new(1))).await.unwrap_err();
        assert!(err.is_schema());
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let graph = MemoryGraph::new();
        graph
            .insert_node(&["Group"], json!({"id": "g1"}).as_object().cloned().unwrap())
            .await;
        let summary = load_with(
            &graph,
            &user_schema(),
            &records(json!([
                {"id": "u1", "name": "Ann", "group_id": "g1"},
                {"id": "u2", "name": "Bob", "group_id": "missing"},
                {"id": "u3", "name": "Cy"}
            ])),
            &Params::new(UpdateTag::new(1)),
            &LoadOptions { batch_size: 2 },
        )
        .await
        .unwrap();
        assert_eq!(summary.nodes_merged, 3);
        assert_eq!(summary.relationships_merged, 1);
        assert_eq!(summary.statements, 4);
    }

    #[tokio::test]
    async fn test_data_error_writes_nothing() {
        let graph = MemoryGraph::new();
        let err = load(
            &graph,
            &user_schema(),
            &records(json!([{"id": "u1"}, {"name": "no id"}])),
            &Params::new(UpdateTag::new(1)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, crate::GraphError::Schema(SchemaError::MissingField { .. })));
        assert_eq!(graph.node_count().await, 0);
    }

    #[tokio::test]
    async fn test_ensure_indexes() {
        let graph = MemoryGraph::new();
        let count = ensure_indexes(&graph, &user_schema()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(ensure_indexes(&graph, &user_schema()).await.unwrap(), 3);
        assert_eq!(graph.indexes().await.len(), 3);
    }
}
