//! Cleanup and analysis jobs.
//!
//! A [`GraphJob`] is an ordered list of statements run one after another.
//! Iterative statements delete at most `LIMIT_SIZE` rows per run and are
//! re-run until they report nothing left to delete.

use std::path::Path;

use graphsync_core::{NodeSchema, Params, RelSchema, SchemaError, SubResource, UpdateTag};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{GraphError, GraphResult};
use crate::plan::{Plan, Statement, LIMIT_PARAM, UPDATE_TAG_PARAM};
use crate::query::matchlink::sub_resource_params;
use crate::query::{build_cleanup_plans, build_matchlink_cleanup_plan, cleanup_params};
use crate::session::GraphSession;

pub const DEFAULT_ITERATION_SIZE: usize = 100;
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// One statement of a job.
#[derive(Debug, Clone)]
pub struct GraphStatement {
    pub statement: Statement,
    pub iterative: bool,
    pub iteration_size: usize,
}

impl GraphStatement {
    pub fn iterative(statement: Statement) -> Self {
        Self {
            statement,
            iterative: true,
            iteration_size: DEFAULT_ITERATION_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphJob {
    pub name: String,
    pub short_name: Option<String>,
    pub statements: Vec<GraphStatement>,
    pub max_iterations: usize,
}

/// What a job run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub statements: usize,
    pub iterations: usize,
    pub affected: u64,
}

#[derive(Debug, Deserialize)]
struct JobFile {
    name: String,
    #[serde(default)]
    statements: Vec<JobFileStatement>,
}

#[derive(Debug, Deserialize)]
struct JobFileStatement {
    query: String,
    #[serde(default)]
    iterative: bool,
    #[serde(default = "default_iteration_size")]
    iterationsize: usize,
}

fn default_iteration_size() -> usize {
    DEFAULT_ITERATION_SIZE
}

impl GraphJob {
    pub fn new(name: impl Into<String>, statements: Vec<GraphStatement>) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            statements,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Stale-data cleanup for everything a node schema loads.
    ///
    /// `params` must hold the update tag of the run and the tenant parameters
    /// the schema's sub-resource relationship matches on.
    pub fn from_node_schema(schema: &NodeSchema, params: &Params) -> GraphResult<Self> {
        let plans = build_cleanup_plans(schema)?;
        let update_tag = params.update_tag()?;
        let scope = cleanup_params(schema, params)?;

        let statements = plans
            .into_iter()
            .map(|plan| {
                GraphStatement::iterative(
                    Statement::new(plan)
                        .with_params(&scope)
                        .with_param(UPDATE_TAG_PARAM, update_tag),
                )
            })
            .collect();

        let mut job = Self::new(format!("Cleanup {}", schema.label), statements);
        job.short_name = Some(schema.label.clone());
        Ok(job)
    }

    /// Stale edge cleanup for a MatchLink loaded under `sub_resource`.
    pub fn from_matchlink(
        rel: &RelSchema,
        sub_resource: &SubResource,
        update_tag: UpdateTag,
    ) -> GraphResult<Self> {
        let plan = build_matchlink_cleanup_plan(rel)?;
        let statement = Statement::new(plan)
            .with_params(&sub_resource_params(sub_resource)?)
            .with_param(UPDATE_TAG_PARAM, update_tag);

        let mut job = Self::new(
            format!("Cleanup {} under {} {}", rel.describe(), sub_resource.label, sub_resource.id),
            vec![GraphStatement::iterative(statement)],
        );
        job.short_name = Some(rel.rel_label.clone());
        Ok(job)
    }

    /// Parse a hand-written JSON job.
    ///
    /// Every entry of `params` is bound, plus `UPDATE_TAG` from the update tag.
    pub fn from_json(json: &str, params: &Params) -> GraphResult<Self> {
        let file: JobFile = serde_json::from_str(json)?;
        let update_tag = params.update_tag()?;

        let mut statements = Vec::with_capacity(file.statements.len());
        for (index, entry) in file.statements.into_iter().enumerate() {
            if entry.query.trim().is_empty() {
                return Err(SchemaError::invalid(
                    file.name.clone(),
                    format!("statement {index} has an empty query"),
                )
                .into());
            }
            let mut statement = Statement::new(Plan::Raw {
                query: entry.query,
                counted: entry.iterative,
            });
            for (name, value) in params.iter() {
                statement = statement.with_param(name.clone(), value.clone());
            }
            statements.push(GraphStatement {
                statement: statement.with_param(UPDATE_TAG_PARAM, update_tag),
                iterative: entry.iterative,
                iteration_size: entry.iterationsize.max(1),
            });
        }
        Ok(Self::new(file.name, statements))
    }

    /// Like [`GraphJob::from_json`]; the file stem becomes the short name.
    pub fn from_json_file(path: &Path, params: &Params) -> GraphResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut job = Self::from_json(&json, params)?;
        job.short_name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        Ok(job)
    }

    pub fn with_iteration_size(mut self, size: usize) -> Self {
        for statement in &mut self.statements {
            statement.iteration_size = size.max(1);
        }
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Run the statements in order. Each run of a statement is its own
    /// transaction, so a failure leaves earlier deletions committed and the
    /// job can simply be re-run.
    pub async fn run(&self, session: &dyn GraphSession) -> GraphResult<JobSummary> {
        info!(job = %self.name, statements = self.statements.len(), "Starting graph job");
        let mut summary = JobSummary::default();

        for graph_statement in &self.statements {
            let statement = graph_statement
                .statement
                .clone()
                .with_param(LIMIT_PARAM, graph_statement.iteration_size as u64);
            let kind = statement.plan.kind();

            if !graph_statement.iterative {
                let affected = session.run(&statement).await?;
                debug!(kind, affected, "Statement complete");
                summary.iterations += 1;
                summary.affected += affected;
                summary.statements += 1;
                continue;
            }

            let mut iterations = 0;
            loop {
                if iterations >= self.max_iterations {
                    return Err(GraphError::CleanupDidNotConverge {
                        statement: statement.cypher.clone(),
                        iterations,
                    });
                }
                let affected = session.run(&statement).await?;
                iterations += 1;
                summary.affected += affected;
                if affected == 0 {
                    break;
                }
            }
            debug!(kind, iterations, "Iterative statement complete");
            summary.iterations += iterations;
            summary.statements += 1;
        }

        info!(
            job = %self.name,
            iterations = summary.iterations,
            affected = summary.affected,
            "Graph job complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphsync_core::{Direction, PropertyRef};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns a fixed sequence of affected counts, then zeroes.
    struct ScriptedSession {
        counts: Mutex<VecDeque<u64>>,
        seen: Mutex<Vec<Statement>>,
    }

    impl ScriptedSession {
        fn new(counts: &[u64]) -> Self {
            Self {
                counts: Mutex::new(counts.iter().copied().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GraphSession for ScriptedSession {
        async fn run(&self, statement: &Statement) -> GraphResult<u64> {
            self.seen.lock().unwrap().push(statement.clone());
            Ok(self.counts.lock().unwrap().pop_front().unwrap_or(0))
        }

        async fn run_all(&self, statements: &[Statement]) -> GraphResult<Vec<u64>> {
            let mut counts = Vec::new();
            for statement in statements {
                counts.push(self.run(statement).await?);
            }
            Ok(counts)
        }
    }

    fn schema() -> NodeSchema {
        NodeSchema::new("Child")
            .property("id", PropertyRef::record("id"))
            .sub_resource(
                RelSchema::new("RESOURCE", "Tenant", Direction::Inward)
                    .match_target("id", PropertyRef::param("TENANT_ID")),
            )
    }

    #[test]
    fn test_from_node_schema_binds_params() {
        let params = Params::new(UpdateTag::new(9)).with("TENANT_ID", "t1");
        let job = GraphJob::from_node_schema(&schema(), &params).unwrap();
        assert_eq!(job.short_name.as_deref(), Some("Child"));
        assert_eq!(job.statements.len(), 2);
        for s in &job.statements {
            assert!(s.iterative);
            assert_eq!(s.statement.params.get("UPDATE_TAG"), Some(&json!(9)));
            assert_eq!(s.statement.params.get("TENANT_ID"), Some(&json!("t1")));
        }
    }

    #[test]
    fn test_from_node_schema_missing_tenant_param() {
        let err =
            GraphJob::from_node_schema(&schema(), &Params::new(UpdateTag::new(9))).unwrap_err();
        assert!(err.is_schema());
    }

    #[tokio::test]
    async fn test_iterative_statement_runs_until_zero() {
        let session = ScriptedSession::new(&[100, 100, 37]);
        let params = Params::new(UpdateTag::new(1)).with("TENANT_ID", "t1");
        let job = GraphJob::from_node_schema(&schema(), &params)
            .unwrap()
            .with_iteration_size(100);

        let summary = job.run(&session).await.unwrap();
        // three non-zero runs plus the zero run, then one zero run for the edge sweep
        assert_eq!(session.calls(), 5);
        assert_eq!(summary.affected, 237);
        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.statements, 2);

        let first = &session.seen.lock().unwrap()[0];
        assert_eq!(first.params.get("LIMIT_SIZE"), Some(&json!(100)));
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let session = ScriptedSession::new(&[1; 10]);
        let params = Params::new(UpdateTag::new(1)).with("TENANT_ID", "t1");
        let job = GraphJob::from_node_schema(&schema(), &params)
            .unwrap()
            .with_max_iterations(3);

        let err = job.run(&session).await.unwrap_err();
        assert!(matches!(err, GraphError::CleanupDidNotConverge { iterations: 3, .. }));
        assert_eq!(session.calls(), 3);
    }

    #[tokio::test]
    async fn test_json_job() {
        let json = json!({
            "name": "Remove stale legacy nodes",
            "statements": [
                {
                    "query": concat!(
                        "MATCH (n:Legacy) WHERE n.lastupdated <> $UPDATE_TAG ",
                        "WITH n LIMIT $LIMIT_SIZE DETACH DELETE n"
                    ),
                    "iterative": true,
                    "iterationsize": 50
                },
                {
                    "query": "MATCH (a:Account {id: $ACCOUNT_ID}) SET a.analyzed = true;",
                    "iterative": false
                }
            ]
        })
        .to_string();
        let params = Params::new(UpdateTag::new(4)).with("ACCOUNT_ID", "123");
        let job = GraphJob::from_json(&json, &params).unwrap();
        assert_eq!(job.statements.len(), 2);
        assert_eq!(job.statements[0].iteration_size, 50);
        assert!(job.statements[0].statement.returns_count());
        assert!(!job.statements[1].statement.returns_count());
        assert_eq!(job.statements[1].statement.params.get("ACCOUNT_ID"), Some(&json!("123")));
        assert_eq!(job.statements[1].statement.params.get("UPDATE_TAG"), Some(&json!(4)));

        let session = ScriptedSession::new(&[50, 3, 0, 7]);
        let summary = job.run(&session).await.unwrap();
        assert_eq!(summary.affected, 60);
        assert_eq!(session.calls(), 4);
    }

    #[test]
    fn test_json_job_rejects_empty_query() {
        let json = r#"{"name": "bad", "statements": [{"query": "  "}]}"#;
        let err = GraphJob::from_json(json, &Params::new(UpdateTag::new(1))).unwrap_err();
        assert!(err.is_schema());
        assert!(GraphJob::from_json("not json", &Params::new(UpdateTag::new(1))).is_err());
    }

    #[test]
    fn test_from_matchlink() {
        let rel = RelSchema::new("ASSUMES", "Role", Direction::Outward)
            .from_source("Principal")
            .match_source("arn", PropertyRef::record("principal_arn"))
            .match_target("arn", PropertyRef::record("role_arn"));
        let account = SubResource::new("Account", "123");
        let job = GraphJob::from_matchlink(&rel, &account, UpdateTag::new(2)).unwrap();
        let params = &job.statements[0].statement.params;
        assert_eq!(params.get("_sub_resource_label"), Some(&json!("Account")));
        assert_eq!(params.get("_sub_resource_id"), Some(&json!("123")));
        assert_eq!(params.get("UPDATE_TAG"), Some(&json!(2)));
    }
}
