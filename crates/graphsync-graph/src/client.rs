//! Neo4j connection client.

use async_trait::async_trait;
use neo4rs::{BoltType, ConfigBuilder, Graph, Query, Row, Txn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GraphError, GraphResult};
use crate::plan::{Statement, AFFECTED_COLUMN};
use crate::session::GraphSession;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_fetch_size() -> usize {
    200
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Client for the Neo4j graph the loaders write to.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Create a new GraphClient from config.
    ///
    /// `Graph::connect` only builds the connection pool; a `RETURN 1` ping
    /// forces a real handshake so an unreachable server fails here.
    pub async fn connect(config: &GraphConfig) -> GraphResult<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()?;

        let graph = Graph::connect(neo4j_config).await?;
        graph.run(Query::new("RETURN 1".to_string())).await?;

        debug!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a Cypher query and return a single scalar value.
    async fn query_scalar(&self, query: Query, field: &str) -> GraphResult<Option<i64>> {
        let mut result = self.graph.execute(query).await?;
        match result.next().await? {
            Some(row) => Ok(Some(column(&row, field)?)),
            None => Ok(None),
        }
    }

    /// Get node and relationship counts for status display.
    pub async fn get_counts(&self) -> GraphResult<GraphCounts> {
        let node_query = Query::new("MATCH (n) RETURN count(n) AS count".to_string());
        let rel_query = Query::new("MATCH ()-[r]->() RETURN count(r) AS count".to_string());

        let node_count = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let rel_count = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: node_count.max(0) as usize,
            relationships: rel_count.max(0) as usize,
        })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    async fn run_in_txn(txn: &mut Txn, statement: &Statement) -> GraphResult<u64> {
        let query = to_query(statement)?;
        if !statement.returns_count() {
            txn.run(query).await?;
            return Ok(0);
        }
        let mut stream = txn.execute(query).await?;
        let mut affected = 0;
        while let Some(row) = stream.next(txn.handle()).await? {
            affected += count(&row)?;
        }
        Ok(affected)
    }
}

#[async_trait]
impl GraphSession for GraphClient {
    async fn run(&self, statement: &Statement) -> GraphResult<u64> {
        let query = to_query(statement)?;
        if !statement.returns_count() {
            self.graph.run(query).await?;
            return Ok(0);
        }
        let mut stream = self.graph.execute(query).await?;
        let mut affected = 0;
        while let Some(row) = stream.next().await? {
            affected += count(&row)?;
        }
        debug!(kind = statement.plan.kind(), affected, "Statement complete");
        Ok(affected)
    }

    async fn run_all(&self, statements: &[Statement]) -> GraphResult<Vec<u64>> {
        let mut txn = self.graph.start_txn().await?;
        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            match Self::run_in_txn(&mut txn, statement).await {
                Ok(affected) => counts.push(affected),
                Err(e) => {
                    warn!(
                        kind = statement.plan.kind(),
                        error = %e,
                        "Statement failed, rolling back"
                    );
                    if let Err(rollback) = txn.rollback().await {
                        warn!(error = %rollback, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        }
        txn.commit().await?;
        Ok(counts)
    }
}

fn column(row: &Row, field: &str) -> GraphResult<i64> {
    row.get::<i64>(field).map_err(|e| GraphError::Deserialize {
        column: field.to_string(),
        reason: e.to_string(),
    })
}

fn count(row: &Row) -> GraphResult<u64> {
    Ok(column(row, AFFECTED_COLUMN)?.max(0) as u64)
}

fn to_query(statement: &Statement) -> GraphResult<Query> {
    let mut query = Query::new(statement.cypher.clone());
    for (name, value) in &statement.params {
        query = query.param(name, json_to_bolt(value)?);
    }
    Ok(query)
}

/// Convert a JSON parameter into its Bolt representation.
pub fn json_to_bolt(value: &Value) -> GraphResult<BoltType> {
    let bolt = match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(v) => BoltType::Boolean(neo4rs::BoltBoolean::new(*v)),
        Value::Number(v) => {
            if let Some(i) = v.as_i64() {
                BoltType::Integer(neo4rs::BoltInteger::new(i))
            } else if let Some(f) = v.as_f64() {
                BoltType::Float(neo4rs::BoltFloat::new(f))
            } else {
                return Err(GraphError::Unsupported(format!(
                    "JSON number {v} has no Bolt equivalent"
                )));
            }
        }
        Value::String(v) => BoltType::String(neo4rs::BoltString::new(v)),
        Value::Array(v) => BoltType::List(neo4rs::BoltList {
            value: v.iter().map(json_to_bolt).collect::<GraphResult<_>>()?,
        }),
        Value::Object(v) => BoltType::Map(neo4rs::BoltMap {
            value: v
                .iter()
                .map(|(k, v)| Ok((neo4rs::BoltString::new(k), json_to_bolt(v)?)))
                .collect::<GraphResult<_>>()?,
        }),
    };
    Ok(bolt)
}

/// Node and relationship counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config: GraphConfig = toml::from_str("uri = \"bolt://graph:7687\"").unwrap();
        assert_eq!(config.uri, "bolt://graph:7687");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.database, "neo4j");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.fetch_size, 200);
    }

    #[test]
    fn test_json_to_bolt() {
        assert!(matches!(json_to_bolt(&json!(null)).unwrap(), BoltType::Null(_)));
        assert!(matches!(json_to_bolt(&json!(3)).unwrap(), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(1.5)).unwrap(), BoltType::Float(_)));
        match json_to_bolt(&json!([{"id": "a"}, {"id": "b"}])).unwrap() {
            BoltType::List(list) => {
                assert_eq!(list.value.len(), 2);
                assert!(matches!(list.value[0], BoltType::Map(_)));
            }
            other => panic!("expected a list, got {other:?}"),
        }
    }
}
