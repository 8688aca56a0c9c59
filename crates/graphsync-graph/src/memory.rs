//! In-memory graph store.
//!
//! Interprets [`Plan`] values directly instead of parsing Cypher, following
//! the same matching rules the rendered statements have on Neo4j: MATCH never
//! creates, comparisons with null never match, `SET x = null` removes the
//! property. Used by tests and by dry runs of the CLI.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use graphsync_core::{Direction, Record, ID, LASTUPDATED, SUB_RESOURCE_ID, SUB_RESOURCE_LABEL};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::client::GraphCounts;
use crate::error::{GraphError, GraphResult};
use crate::plan::{
    Assignment, Comparison, DeleteNodes, DeleteRelationships, MergeNodes, MergeRelationships,
    NodePattern, Plan, Scope, Statement, LIMIT_PARAM, UPDATE_TAG_PARAM,
};
use crate::session::GraphSession;

type NodeKey = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub labels: BTreeSet<String>,
    pub properties: Record,
}

impl StoredNode {
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub rel_label: String,
    pub from: NodeKey,
    pub to: NodeKey,
    pub properties: Record,
}

impl StoredEdge {
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: BTreeMap<NodeKey, StoredNode>,
    edges: BTreeMap<NodeKey, StoredEdge>,
    indexes: BTreeSet<(String, String)>,
    next_key: NodeKey,
}

/// A graph held in memory. Every `run_all` call is one transaction: the
/// state is only replaced when all its statements succeed.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: RwLock<GraphState>,
    fail_countdown: Mutex<Option<usize>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the statement after the next `n` fail with a store error.
    pub async fn fail_after(&self, n: usize) {
        *self.fail_countdown.lock().await = Some(n);
    }

    /// Insert a node outside any load, e.g. a tenant created by another module.
    pub async fn insert_node(&self, labels: &[&str], properties: Record) -> NodeKey {
        let mut state = self.state.write().await;
        state.add_node(StoredNode {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties,
        })
    }

    pub async fn node(&self, label: &str, id: impl Into<Value>) -> Option<StoredNode> {
        let id = id.into();
        let state = self.state.read().await;
        state
            .find_by_id(label, &id)
            .and_then(|key| state.nodes.get(&key))
            .cloned()
    }

    pub async fn nodes(&self, label: &str) -> Vec<StoredNode> {
        let state = self.state.read().await;
        state
            .nodes
            .values()
            .filter(|n| n.labels.contains(label))
            .cloned()
            .collect()
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.read().await.edges.len()
    }

    pub async fn counts(&self) -> GraphCounts {
        let state = self.state.read().await;
        GraphCounts {
            nodes: state.nodes.len(),
            relationships: state.edges.len(),
        }
    }

    /// The edge `(from_label {id: from_id})-[rel_label]->(to_label {id: to_id})`.
    pub async fn edge(
        &self,
        from_label: &str,
        from_id: impl Into<Value>,
        rel_label: &str,
        to_label: &str,
        to_id: impl Into<Value>,
    ) -> Option<StoredEdge> {
        let (from_id, to_id) = (from_id.into(), to_id.into());
        let state = self.state.read().await;
        let from = state.find_by_id(from_label, &from_id)?;
        let to = state.find_by_id(to_label, &to_id)?;
        state.find_edge(rel_label, from, to).and_then(|key| state.edges.get(&key)).cloned()
    }

    pub async fn has_edge(
        &self,
        from_label: &str,
        from_id: impl Into<Value>,
        rel_label: &str,
        to_label: &str,
        to_id: impl Into<Value>,
    ) -> bool {
        self.edge(from_label, from_id, rel_label, to_label, to_id).await.is_some()
    }

    /// Number of edges with the given type.
    pub async fn relationship_count(&self, rel_label: &str) -> usize {
        let state = self.state.read().await;
        state.edges.values().filter(|e| e.rel_label == rel_label).count()
    }

    pub async fn indexes(&self) -> Vec<(String, String)> {
        self.state.read().await.indexes.iter().cloned().collect()
    }

    async fn check_injected_failure(&self) -> GraphResult<()> {
        let mut countdown = self.fail_countdown.lock().await;
        match countdown.as_mut() {
            Some(0) => {
                *countdown = None;
                Err(GraphError::store("injected failure"))
            }
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GraphSession for MemoryGraph {
    async fn run(&self, statement: &Statement) -> GraphResult<u64> {
        let counts = self.run_all(std::slice::from_ref(statement)).await?;
        Ok(counts.into_iter().next().unwrap_or(0))
    }

    async fn run_all(&self, statements: &[Statement]) -> GraphResult<Vec<u64>> {
        let mut state = self.state.write().await;
        let mut working = state.clone();
        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            self.check_injected_failure().await?;
            let affected = working.execute(statement)?;
            debug!(kind = statement.plan.kind(), affected, "In-memory statement complete");
            counts.push(affected);
        }
        *state = working;
        Ok(counts)
    }
}

fn param<'a>(params: &'a BTreeMap<String, Value>, name: &str) -> GraphResult<&'a Value> {
    params
        .get(name)
        .ok_or_else(|| GraphError::store(format!("expected parameter ${name}")))
}

fn limit(params: &BTreeMap<String, Value>) -> GraphResult<usize> {
    param(params, LIMIT_PARAM)?
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| GraphError::store(format!("${LIMIT_PARAM} must be a non-negative integer")))
}

/// `x.lastupdated <> $UPDATE_TAG`; a missing property is never stale.
fn is_stale(properties: &Record, update_tag: &Value) -> bool {
    match properties.get(LASTUPDATED) {
        Some(Value::Null) | None => false,
        Some(value) => value != update_tag,
    }
}

fn fan_out_values(item: &Record, field: &str) -> Vec<Value> {
    match item.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values.clone(),
        Some(value) => vec![value.clone()],
    }
}

fn apply(
    properties: &mut Record,
    assignments: &[Assignment],
    item: Option<&Record>,
    params: &BTreeMap<String, Value>,
    fan_out: Option<&Value>,
) {
    for assignment in assignments {
        match assignment.operand.resolve(item, params, fan_out) {
            Some(value) => {
                properties.insert(assignment.property.clone(), value.clone());
            }
            None => {
                properties.remove(&assignment.property);
            }
        }
    }
}

fn now_millis() -> Value {
    Value::from(Utc::now().timestamp_millis())
}

impl GraphState {
    fn add_node(&mut self, node: StoredNode) -> NodeKey {
        let key = self.next_key;
        self.next_key += 1;
        self.nodes.insert(key, node);
        key
    }

    fn add_edge(&mut self, edge: StoredEdge) -> NodeKey {
        let key = self.next_key;
        self.next_key += 1;
        self.edges.insert(key, edge);
        key
    }

    fn find_by_id(&self, label: &str, id: &Value) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.labels.contains(label) && n.get(ID) == Some(id))
            .map(|(key, _)| *key)
    }

    fn find_edge(&self, rel_label: &str, from: NodeKey, to: NodeKey) -> Option<NodeKey> {
        self.edges
            .iter()
            .find(|(_, e)| e.rel_label == rel_label && e.from == from && e.to == to)
            .map(|(key, _)| *key)
    }

    fn matching(
        &self,
        pattern: &NodePattern,
        item: Option<&Record>,
        params: &BTreeMap<String, Value>,
        fan_out: Option<&Value>,
    ) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter(|(_, node)| {
                node.labels.contains(&pattern.label)
                    && pattern.conditions.iter().all(|c| {
                        c.comparison
                            .test(node.get(&c.property), c.operand.resolve(item, params, fan_out))
                    })
            })
            .map(|(key, _)| *key)
            .collect()
    }

    /// Orient `(n)-[r]-(other)` by direction into `(from, to)`.
    fn oriented(direction: Direction, n: NodeKey, other: NodeKey) -> (NodeKey, NodeKey) {
        match direction {
            Direction::Outward => (n, other),
            Direction::Inward => (other, n),
        }
    }

    fn in_scope(&self, node: NodeKey, scope: &Scope, params: &BTreeMap<String, Value>) -> bool {
        let tenants = self.matching(&scope.tenant, None, params, None);
        self.edges.values().any(|e| {
            e.rel_label == scope.rel_label
                && tenants.iter().any(|t| {
                    let (from, to) = Self::oriented(scope.direction, node, *t);
                    e.from == from && e.to == to
                })
        })
    }

    fn execute(&mut self, statement: &Statement) -> GraphResult<u64> {
        let params = &statement.params;
        match &statement.plan {
            Plan::MergeNodes(plan) => self.merge_nodes(plan, statement),
            Plan::MergeRelationships(plan) => Ok(self.merge_relationships(plan, statement)),
            Plan::DeleteNodes(plan) => self.delete_nodes(plan, params),
            Plan::DeleteRelationships(plan) => self.delete_relationships(plan, params),
            Plan::CreateIndex(plan) => {
                self.indexes.insert((plan.label.clone(), plan.property.clone()));
                Ok(0)
            }
            Plan::Raw { .. } => Err(GraphError::Unsupported(
                "raw Cypher cannot run against the in-memory graph".to_string(),
            )),
        }
    }

    fn merge_nodes(&mut self, plan: &MergeNodes, statement: &Statement) -> GraphResult<u64> {
        let params = &statement.params;
        let mut affected = 0;
        for item in statement.batch() {
            let key_value = plan
                .key
                .resolve(Some(item), params, None)
                .cloned()
                .ok_or_else(|| {
                    GraphError::store(format!("cannot merge {} on a null id", plan.label))
                })?;

            let key = match self.find_by_id(&plan.label, &key_value) {
                Some(key) => key,
                None => {
                    let mut properties = Record::new();
                    properties.insert(ID.to_string(), key_value);
                    properties.insert("firstseen".to_string(), now_millis());
                    self.add_node(StoredNode {
                        labels: BTreeSet::from([plan.label.clone()]),
                        properties,
                    })
                }
            };
            if let Some(node) = self.nodes.get_mut(&key) {
                apply(&mut node.properties, &plan.properties, Some(item), params, None);
                node.labels.extend(plan.extra_labels.iter().cloned());
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn merge_relationships(&mut self, plan: &MergeRelationships, statement: &Statement) -> u64 {
        let params = &statement.params;
        let mut affected = 0;
        for item in statement.batch() {
            let fan_out: Vec<Option<Value>> = match &plan.fan_out {
                Some(field) => fan_out_values(item, field).into_iter().map(Some).collect(),
                None => vec![None],
            };
            for value in &fan_out {
                let sources = self.matching(&plan.source, Some(item), params, value.as_ref());
                let targets = self.matching(&plan.target, Some(item), params, value.as_ref());
                for s in &sources {
                    for t in &targets {
                        let (from, to) = Self::oriented(plan.direction, *s, *t);
                        let key = match self.find_edge(&plan.rel_label, from, to) {
                            Some(key) => key,
                            None => {
                                let mut properties = Record::new();
                                properties.insert("firstseen".to_string(), now_millis());
                                self.add_edge(StoredEdge {
                                    rel_label: plan.rel_label.clone(),
                                    from,
                                    to,
                                    properties,
                                })
                            }
                        };
                        if let Some(edge) = self.edges.get_mut(&key) {
                            apply(
                                &mut edge.properties,
                                &plan.properties,
                                Some(item),
                                params,
                                value.as_ref(),
                            );
                        }
                        affected += 1;
                    }
                }
            }
        }
        affected
    }

    fn delete_nodes(
        &mut self,
        plan: &DeleteNodes,
        params: &BTreeMap<String, Value>,
    ) -> GraphResult<u64> {
        let update_tag = param(params, UPDATE_TAG_PARAM)?;
        let limit = limit(params)?;

        let doomed: Vec<NodeKey> = self
            .nodes
            .iter()
            .filter(|(key, node)| {
                node.labels.contains(&plan.label)
                    && is_stale(&node.properties, update_tag)
                    && plan.scope.as_ref().is_none_or(|scope| self.in_scope(**key, scope, params))
            })
            .map(|(key, _)| *key)
            .take(limit)
            .collect();

        for key in &doomed {
            self.nodes.remove(key);
            self.edges.retain(|_, e| e.from != *key && e.to != *key);
        }
        Ok(doomed.len() as u64)
    }

    fn delete_relationships(
        &mut self,
        plan: &DeleteRelationships,
        params: &BTreeMap<String, Value>,
    ) -> GraphResult<u64> {
        let update_tag = param(params, UPDATE_TAG_PARAM)?;
        let limit = limit(params)?;
        let sub_resource = if plan.tagged {
            Some((param(params, SUB_RESOURCE_LABEL)?, param(params, SUB_RESOURCE_ID)?))
        } else {
            None
        };
        let targets = self.matching(&plan.target, None, params, None);

        let doomed: Vec<NodeKey> = self
            .edges
            .iter()
            .filter(|(_, edge)| {
                if edge.rel_label != plan.rel_label || !is_stale(&edge.properties, update_tag) {
                    return false;
                }
                let (n, t) = match plan.direction {
                    Direction::Outward => (edge.from, edge.to),
                    Direction::Inward => (edge.to, edge.from),
                };
                let source_ok = self
                    .nodes
                    .get(&n)
                    .is_some_and(|node| node.labels.contains(&plan.source_label));
                let tag_ok = sub_resource.is_none_or(|(label, id)| {
                    Comparison::Equals.test(edge.get(SUB_RESOURCE_LABEL), Some(label))
                        && Comparison::Equals.test(edge.get(SUB_RESOURCE_ID), Some(id))
                });
                source_ok
                    && tag_ok
                    && targets.contains(&t)
                    && plan.scope.as_ref().is_none_or(|scope| self.in_scope(n, scope, params))
            })
            .map(|(key, _)| *key)
            .take(limit)
            .collect();

        for key in &doomed {
            self.edges.remove(key);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Condition, CreateIndex, Operand, BATCH_PARAM};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn merge_users() -> Statement {
        Statement::new(Plan::MergeNodes(MergeNodes {
            label: "User".to_string(),
            extra_labels: vec![],
            key: Operand::Item("id".to_string()),
            properties: vec![
                Assignment::new("lastupdated", Operand::Param("lastupdated".to_string())),
                Assignment::new("name", Operand::Item("name".to_string())),
            ],
        }))
        .with_param("lastupdated", 1)
    }

    #[tokio::test]
    async fn test_merge_nodes_sets_and_removes() {
        let graph = MemoryGraph::new();
        graph
            .run(&merge_users().with_param(BATCH_PARAM, json!([{"id": "u1", "name": "Ann"}])))
            .await
            .unwrap();
        let first = graph.node("User", "u1").await.unwrap();
        assert_eq!(first.get("name"), Some(&json!("Ann")));

        graph
            .run(&merge_users().with_param(BATCH_PARAM, json!([{"id": "u1"}])))
            .await
            .unwrap();
        let second = graph.node("User", "u1").await.unwrap();
        assert_eq!(second.get("name"), None);
        assert_eq!(second.get("firstseen"), first.get("firstseen"));
        assert_eq!(graph.node_count().await, 1);
    }

    #[tokio::test]
    async fn test_null_merge_key_is_error() {
        let graph = MemoryGraph::new();
        let err = graph
            .run(&merge_users().with_param(BATCH_PARAM, json!([{"name": "nobody"}])))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Store(_)));
    }

    #[tokio::test]
    async fn test_run_all_rolls_back() {
        let graph = MemoryGraph::new();
        graph.fail_after(1).await;
        let statements = vec![
            merge_users().with_param(BATCH_PARAM, json!([{"id": "u1"}])),
            merge_users().with_param(BATCH_PARAM, json!([{"id": "u2"}])),
        ];
        assert!(graph.run_all(&statements).await.is_err());
        assert_eq!(graph.node_count().await, 0);

        assert_eq!(graph.run_all(&statements).await.unwrap(), vec![1, 1]);
        assert_eq!(graph.node_count().await, 2);
    }

    #[tokio::test]
    async fn test_delete_respects_limit_and_missing_tag() {
        let graph = MemoryGraph::new();
        for i in 0..5 {
            graph
                .insert_node(&["Old"], record(json!({"id": i, "lastupdated": 1})))
                .await;
        }
        graph.insert_node(&["Old"], record(json!({"id": "untagged"}))).await;

        let delete = Statement::new(Plan::DeleteNodes(DeleteNodes {
            label: "Old".to_string(),
            scope: None,
        }))
        .with_param(UPDATE_TAG_PARAM, 2)
        .with_param(LIMIT_PARAM, 2);

        assert_eq!(graph.run(&delete).await.unwrap(), 2);
        assert_eq!(graph.run(&delete).await.unwrap(), 2);
        assert_eq!(graph.run(&delete).await.unwrap(), 1);
        assert_eq!(graph.run(&delete).await.unwrap(), 0);
        assert_eq!(graph.nodes("Old").await.len(), 1);
    }

    #[tokio::test]
    async fn test_match_uses_case_insensitive_conditions() {
        let graph = MemoryGraph::new();
        graph
            .insert_node(&["Person"], record(json!({"id": 1, "email": "Ann@Example.com"})))
            .await;
        graph.insert_node(&["Badge"], record(json!({"id": "b1"}))).await;

        let link = Statement::new(Plan::MergeRelationships(MergeRelationships {
            source: NodePattern {
                label: "Badge".to_string(),
                conditions: vec![Condition::equals("id", Operand::Item("badge".to_string()))],
            },
            target: NodePattern {
                label: "Person".to_string(),
                conditions: vec![Condition {
                    property: "email".to_string(),
                    operand: Operand::Item("email".to_string()),
                    comparison: Comparison::EqualsIgnoreCase,
                }],
            },
            rel_label: "HELD_BY".to_string(),
            direction: Direction::Outward,
            fan_out: None,
            properties: vec![],
        }))
        .with_param(BATCH_PARAM, json!([{"badge": "b1", "email": "ann@example.com"}]));

        assert_eq!(graph.run(&link).await.unwrap(), 1);
        assert!(graph.has_edge("Badge", "b1", "HELD_BY", "Person", 1).await);
    }

    #[tokio::test]
    async fn test_index_and_raw() {
        let graph = MemoryGraph::new();
        let index = Statement::new(Plan::CreateIndex(CreateIndex {
            label: "User".to_string(),
            property: "id".to_string(),
        }));
        assert_eq!(graph.run(&index).await.unwrap(), 0);
        assert_eq!(graph.indexes().await, vec![("User".to_string(), "id".to_string())]);

        let raw = Statement::new(Plan::Raw {
            query: "MATCH (n) RETURN n".to_string(),
            counted: false,
        });
        assert!(matches!(graph.run(&raw).await, Err(GraphError::Unsupported(_))));
    }
}
