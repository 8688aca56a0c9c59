//! Structured statements and their Cypher rendering.
//!
//! Every builder in this crate emits [`Plan`] values. A plan is rendered to
//! Cypher for Neo4j and interpreted directly by the in-memory graph, so both
//! backends execute the same compiled statement.
//!
//! Batched statements iterate `$DictList` as `item`:
//!
//! ```cypher
//! UNWIND $DictList AS item
//! MERGE (i:Child {id: item.id})
//! ON CREATE SET i.firstseen = timestamp()
//! SET
//!     i.lastupdated = $lastupdated,
//!     i.name = item.name
//! RETURN count(i) AS affected
//! ```

use std::collections::BTreeMap;

use graphsync_core::{
    escape_identifier, Direction, PropertyRef, Record, ID, LASTUPDATED, SUB_RESOURCE_ID,
    SUB_RESOURCE_LABEL,
};
use serde_json::Value;

/// Parameter holding the list of projected records.
pub const BATCH_PARAM: &str = "DictList";
/// Parameter holding the update tag in cleanup statements.
pub const UPDATE_TAG_PARAM: &str = "UPDATE_TAG";
/// Parameter bounding how many rows one cleanup iteration deletes.
pub const LIMIT_PARAM: &str = "LIMIT_SIZE";
/// Column every counted statement returns.
pub const AFFECTED_COLUMN: &str = "affected";

const FAN_OUT_VAR: &str = "fan_out_value";

/// Where a value comes from while a statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A field of the current batch item.
    Item(String),
    /// A statement parameter.
    Param(String),
    /// The current element of an unwound one-to-many list.
    FanOut,
}

impl Operand {
    pub fn from_ref(reference: &PropertyRef) -> Self {
        if reference.one_to_many {
            Self::FanOut
        } else if reference.is_param() {
            Self::Param(reference.name.clone())
        } else {
            Self::Item(reference.name.clone())
        }
    }

    pub fn to_cypher(&self) -> String {
        match self {
            Self::Item(field) => format!("item.{}", escape_identifier(field)),
            Self::Param(name) => format!("${}", escape_identifier(name)),
            Self::FanOut => FAN_OUT_VAR.to_string(),
        }
    }

    /// Evaluate the operand. Absent and null values both yield `None`.
    pub fn resolve<'a>(
        &self,
        item: Option<&'a Record>,
        params: &'a BTreeMap<String, Value>,
        fan_out: Option<&'a Value>,
    ) -> Option<&'a Value> {
        let value = match self {
            Self::Item(field) => item.and_then(|i| i.get(field)),
            Self::Param(name) => params.get(name),
            Self::FanOut => fan_out,
        };
        value.filter(|v| !v.is_null())
    }
}

/// How a node property is compared with an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    EqualsIgnoreCase,
    ContainsIgnoreCase,
}

impl Comparison {
    fn from_ref(reference: &PropertyRef) -> Self {
        if reference.fuzzy_and_ignore_case {
            Self::ContainsIgnoreCase
        } else if reference.ignore_case {
            Self::EqualsIgnoreCase
        } else {
            Self::Equals
        }
    }

    /// Cypher null semantics: anything compared with null is not a match.
    pub fn test(&self, property: Option<&Value>, operand: Option<&Value>) -> bool {
        let (Some(property), Some(operand)) = (property, operand) else {
            return false;
        };
        match self {
            Self::Equals => property == operand,
            Self::EqualsIgnoreCase => match (property.as_str(), operand.as_str()) {
                (Some(p), Some(o)) => p.to_lowercase() == o.to_lowercase(),
                _ => false,
            },
            Self::ContainsIgnoreCase => match (property.as_str(), operand.as_str()) {
                (Some(p), Some(o)) => p.to_lowercase().contains(&o.to_lowercase()),
                _ => false,
            },
        }
    }
}

/// One predicate on a matched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub property: String,
    pub operand: Operand,
    pub comparison: Comparison,
}

impl Condition {
    pub fn equals(property: impl Into<String>, operand: Operand) -> Self {
        Self {
            property: property.into(),
            operand,
            comparison: Comparison::Equals,
        }
    }

    pub fn from_matcher(property: &str, reference: &PropertyRef) -> Self {
        Self {
            property: property.to_string(),
            operand: Operand::from_ref(reference),
            comparison: Comparison::from_ref(reference),
        }
    }

    fn to_cypher(&self, var: &str) -> String {
        let property = format!("{var}.{}", escape_identifier(&self.property));
        let operand = self.operand.to_cypher();
        match self.comparison {
            Comparison::Equals => format!("{property} = {operand}"),
            Comparison::EqualsIgnoreCase => format!("toLower({property}) = toLower({operand})"),
            Comparison::ContainsIgnoreCase => {
                format!("toLower({property}) CONTAINS toLower({operand})")
            }
        }
    }
}

/// A label plus the conditions a node must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePattern {
    pub label: String,
    pub conditions: Vec<Condition>,
}

impl NodePattern {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            conditions: Vec::new(),
        }
    }

    pub fn matcher(label: &str, matcher: &BTreeMap<String, PropertyRef>) -> Self {
        Self {
            label: label.to_string(),
            conditions: matcher
                .iter()
                .map(|(property, reference)| Condition::from_matcher(property, reference))
                .collect(),
        }
    }

    fn where_terms(&self, var: &str) -> Vec<String> {
        self.conditions.iter().map(|c| c.to_cypher(var)).collect()
    }
}

/// `SET <var>.<property> = <operand>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub property: String,
    pub operand: Operand,
}

impl Assignment {
    pub fn new(property: impl Into<String>, operand: Operand) -> Self {
        Self {
            property: property.into(),
            operand,
        }
    }
}

/// The tenant a node must hang off to be considered by a scoped cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub rel_label: String,
    /// Direction from the scoped node to the tenant.
    pub direction: Direction,
    pub tenant: NodePattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeNodes {
    pub label: String,
    pub extra_labels: Vec<String>,
    pub key: Operand,
    pub properties: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRelationships {
    pub source: NodePattern,
    pub target: NodePattern,
    pub rel_label: String,
    pub direction: Direction,
    /// Item field unwound before matching; one edge per element.
    pub fan_out: Option<String>,
    pub properties: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNodes {
    pub label: String,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRelationships {
    pub source_label: String,
    pub scope: Option<Scope>,
    pub rel_label: String,
    pub direction: Direction,
    pub target: NodePattern,
    /// Only edges stamped with the `_sub_resource_*` parameters.
    pub tagged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndex {
    pub label: String,
    pub property: String,
}

/// One compiled statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    MergeNodes(MergeNodes),
    MergeRelationships(MergeRelationships),
    DeleteNodes(DeleteNodes),
    DeleteRelationships(DeleteRelationships),
    CreateIndex(CreateIndex),
    /// Hand-written Cypher from a JSON job file. `counted` statements get an
    /// `affected` column appended.
    Raw { query: String, counted: bool },
}

impl Plan {
    /// Whether the rendered statement returns an `affected` column.
    pub fn returns_count(&self) -> bool {
        match self {
            Self::CreateIndex(_) => false,
            Self::Raw { counted, .. } => *counted,
            _ => true,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MergeNodes(_) => "merge_nodes",
            Self::MergeRelationships(_) => "merge_relationships",
            Self::DeleteNodes(_) => "delete_nodes",
            Self::DeleteRelationships(_) => "delete_relationships",
            Self::CreateIndex(_) => "create_index",
            Self::Raw { .. } => "raw",
        }
    }

    pub fn to_cypher(&self) -> String {
        match self {
            Self::MergeNodes(p) => render_merge_nodes(p),
            Self::MergeRelationships(p) => render_merge_relationships(p),
            Self::DeleteNodes(p) => render_delete_nodes(p),
            Self::DeleteRelationships(p) => render_delete_relationships(p),
            Self::CreateIndex(p) => format!(
                "CREATE INDEX IF NOT EXISTS FOR (n:{}) ON (n.{})",
                escape_identifier(&p.label),
                escape_identifier(&p.property)
            ),
            Self::Raw { query, counted } => {
                let query = query.trim().trim_end_matches(';').trim_end();
                if *counted {
                    format!("{query}\nRETURN count(*) AS {AFFECTED_COLUMN}")
                } else {
                    query.to_string()
                }
            }
        }
    }
}

/// A plan together with its rendered text and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub plan: Plan,
    pub cypher: String,
    pub params: BTreeMap<String, Value>,
}

impl Statement {
    pub fn new(plan: Plan) -> Self {
        let cypher = plan.to_cypher();
        Self {
            plan,
            cypher,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: &BTreeMap<String, Value>) -> Self {
        self.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn returns_count(&self) -> bool {
        self.plan.returns_count()
    }

    /// Items bound to `$DictList`.
    pub fn batch(&self) -> impl Iterator<Item = &Record> {
        self.params
            .get(BATCH_PARAM)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }
}

fn arrow(direction: Direction, var: &str, rel_label: &str) -> String {
    let rel_label = escape_identifier(rel_label);
    match direction {
        Direction::Outward => format!("-[{var}:{rel_label}]->"),
        Direction::Inward => format!("<-[{var}:{rel_label}]-"),
    }
}

fn set_block(var: &str, assignments: &[Assignment]) -> Vec<String> {
    if assignments.is_empty() {
        return Vec::new();
    }
    let last = assignments.len() - 1;
    let mut lines = vec!["SET".to_string()];
    for (i, a) in assignments.iter().enumerate() {
        let sep = if i == last { "" } else { "," };
        lines.push(format!(
            "    {var}.{} = {}{sep}",
            escape_identifier(&a.property),
            a.operand.to_cypher()
        ));
    }
    lines
}

fn where_line(terms: Vec<String>) -> Option<String> {
    if terms.is_empty() {
        None
    } else {
        Some(format!("WHERE {}", terms.join(" AND ")))
    }
}

fn stale_term(var: &str) -> String {
    format!("{var}.{LASTUPDATED} <> ${UPDATE_TAG_PARAM}")
}

fn render_merge_nodes(p: &MergeNodes) -> String {
    let mut lines = vec![
        format!("UNWIND ${BATCH_PARAM} AS item"),
        format!(
            "MERGE (i:{} {{{ID}: {}}})",
            escape_identifier(&p.label),
            p.key.to_cypher()
        ),
        "ON CREATE SET i.firstseen = timestamp()".to_string(),
    ];
    lines.extend(set_block("i", &p.properties));
    if !p.extra_labels.is_empty() {
        let labels: Vec<_> = p.extra_labels.iter().map(|l| escape_identifier(l)).collect();
        lines.push(format!("SET i:{}", labels.join(":")));
    }
    lines.push(format!("RETURN count(i) AS {AFFECTED_COLUMN}"));
    lines.join("\n")
}

fn render_merge_relationships(p: &MergeRelationships) -> String {
    let mut lines = vec![format!("UNWIND ${BATCH_PARAM} AS item")];
    if let Some(field) = &p.fan_out {
        lines.push(format!(
            "UNWIND item.{} AS {FAN_OUT_VAR}",
            escape_identifier(field)
        ));
    }
    lines.push(format!("MATCH (s:{})", escape_identifier(&p.source.label)));
    lines.extend(where_line(p.source.where_terms("s")));
    lines.push(format!("MATCH (t:{})", escape_identifier(&p.target.label)));
    lines.extend(where_line(p.target.where_terms("t")));
    lines.push(format!("MERGE (s){}(t)", arrow(p.direction, "r", &p.rel_label)));
    lines.push("ON CREATE SET r.firstseen = timestamp()".to_string());
    lines.extend(set_block("r", &p.properties));
    lines.push(format!("RETURN count(r) AS {AFFECTED_COLUMN}"));
    lines.join("\n")
}

fn scope_match(scope: &Scope, source_label: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "MATCH (n:{}){}(scope:{})",
        escape_identifier(source_label),
        arrow(scope.direction, "", &scope.rel_label),
        escape_identifier(&scope.tenant.label)
    )];
    lines.extend(where_line(scope.tenant.where_terms("scope")));
    lines
}

fn render_delete_nodes(p: &DeleteNodes) -> String {
    let mut lines = match &p.scope {
        Some(scope) => {
            let mut terms = scope.tenant.where_terms("scope");
            terms.push(stale_term("n"));
            vec![
                format!(
                    "MATCH (n:{}){}(scope:{})",
                    escape_identifier(&p.label),
                    arrow(scope.direction, "", &scope.rel_label),
                    escape_identifier(&scope.tenant.label)
                ),
                format!("WHERE {}", terms.join(" AND ")),
            ]
        }
        None => vec![
            format!("MATCH (n:{})", escape_identifier(&p.label)),
            format!("WHERE {}", stale_term("n")),
        ],
    };
    lines.push(format!("WITH n LIMIT ${LIMIT_PARAM}"));
    lines.push("DETACH DELETE n".to_string());
    lines.push(format!("RETURN count(*) AS {AFFECTED_COLUMN}"));
    lines.join("\n")
}

fn render_delete_relationships(p: &DeleteRelationships) -> String {
    let mut lines = Vec::new();
    let source = match &p.scope {
        Some(scope) => {
            lines.extend(scope_match(scope, &p.source_label));
            "n".to_string()
        }
        None => format!("n:{}", escape_identifier(&p.source_label)),
    };
    lines.push(format!(
        "MATCH ({source}){}(t:{})",
        arrow(p.direction, "r", &p.rel_label),
        escape_identifier(&p.target.label)
    ));
    let mut terms = vec![stale_term("r")];
    terms.extend(p.target.where_terms("t"));
    if p.tagged {
        terms.push(format!("r.{SUB_RESOURCE_LABEL} = ${SUB_RESOURCE_LABEL}"));
        terms.push(format!("r.{SUB_RESOURCE_ID} = ${SUB_RESOURCE_ID}"));
    }
    lines.push(format!("WHERE {}", terms.join(" AND ")));
    lines.push(format!("WITH r LIMIT ${LIMIT_PARAM}"));
    lines.push("DELETE r".to_string());
    lines.push(format!("RETURN count(*) AS {AFFECTED_COLUMN}"));
    lines.join("\n")
}
