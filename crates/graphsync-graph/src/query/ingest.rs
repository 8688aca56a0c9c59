//! Node ingestion: schema + records + batch parameters → batched upserts.

use std::collections::BTreeMap;

use graphsync_core::{
    check_property_value, NodeSchema, Params, PropertyRef, Record, RelSchema, SchemaError,
    SchemaResult, ID,
};
use serde_json::Value;

use crate::plan::{
    Assignment, Condition, MergeNodes, MergeRelationships, NodePattern, Operand, Plan, Statement,
    BATCH_PARAM,
};

/// A record field read by a compiled schema.
#[derive(Debug, Clone)]
pub(crate) struct FieldSpec {
    reference: PropertyRef,
    required: bool,
    list: bool,
}

/// Compiled form of one load call.
///
/// Holds the node upsert (absent for MatchLinks), the relationship upserts,
/// the record fields to project and the statement parameters.
#[derive(Debug, Clone)]
pub struct IngestionPlan {
    pub(crate) name: String,
    pub(crate) node: Option<MergeNodes>,
    pub(crate) relationships: Vec<MergeRelationships>,
    pub(crate) fields: BTreeMap<String, FieldSpec>,
    pub(crate) params: Params,
    pub(crate) bound: BTreeMap<String, Value>,
}

/// Compile a node schema for loading.
///
/// Validates the schema and checks every batch parameter it reads, so
/// configuration errors surface before any record is looked at.
pub fn compile_node_ingestion(schema: &NodeSchema, params: &Params) -> SchemaResult<IngestionPlan> {
    schema.validate()?;
    let bound = bind_params(&schema.label, schema.references(), params)?;

    let mut fields = BTreeMap::new();
    for (name, reference) in &schema.properties {
        add_field(&mut fields, reference, name == ID || reference.required);
    }
    for rel in schema.relationships() {
        for reference in rel.references() {
            add_field(&mut fields, reference, reference.required);
        }
    }

    let key = schema
        .id_ref()
        .map(Operand::from_ref)
        .ok_or_else(|| SchemaError::invalid(schema.label.clone(), "properties must include 'id'"))?;

    let node = MergeNodes {
        label: schema.label.clone(),
        extra_labels: schema.extra_labels.clone(),
        key: key.clone(),
        properties: schema
            .properties
            .iter()
            .filter(|(name, _)| name.as_str() != ID)
            .map(|(name, reference)| Assignment::new(name.clone(), Operand::from_ref(reference)))
            .collect(),
    };

    let source = NodePattern {
        label: schema.label.clone(),
        conditions: vec![Condition::equals(ID, key)],
    };
    let relationships = schema
        .relationships()
        .map(|rel| merge_relationship(source.clone(), rel, Vec::new()))
        .collect();

    Ok(IngestionPlan {
        name: schema.label.clone(),
        node: Some(node),
        relationships,
        fields,
        params: params.clone(),
        bound,
    })
}

impl IngestionPlan {
    /// Name used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_plan(&self) -> Option<&MergeNodes> {
        self.node.as_ref()
    }

    pub fn relationship_plans(&self) -> &[MergeRelationships] {
        &self.relationships
    }

    /// Project records onto the fields the schema reads.
    ///
    /// Fails the whole batch on the first record lacking a required field or
    /// carrying a value that cannot be stored. Optional fields that are
    /// absent or null are left out of the item.
    pub fn project(&self, records: &[Record]) -> SchemaResult<Vec<Value>> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| self.project_record(index, record).map(Value::Object))
            .collect()
    }

    fn project_record(&self, index: usize, record: &Record) -> SchemaResult<Record> {
        let mut item = Record::new();
        for (field, spec) in &self.fields {
            let value = match spec.reference.resolve(record, &self.params) {
                Ok(Value::Null) | Err(_) if spec.required => {
                    return Err(SchemaError::MissingField {
                        schema: self.name.clone(),
                        index,
                        field: field.clone(),
                    })
                }
                Ok(Value::Null) | Err(_) => continue,
                Ok(value) => value,
            };
            let invalid = |reason: String| SchemaError::InvalidValue {
                schema: self.name.clone(),
                index,
                field: field.clone(),
                reason,
            };
            check_property_value(value).map_err(invalid)?;
            if spec.list && !value.is_array() {
                return Err(invalid(format!("expected a list of target keys, got {value}")));
            }
            item.insert(field.clone(), value.clone());
        }
        Ok(item)
    }

    /// Statements for one load call, in execution order.
    ///
    /// Records are projected first so a bad record fails the call before
    /// anything is sent. Every node chunk precedes every relationship chunk,
    /// so a relationship can target a node created by the same call.
    pub fn statements(
        &self,
        records: &[Record],
        batch_size: usize,
    ) -> SchemaResult<Vec<Statement>> {
        let items = self.project(records)?;
        let chunks: Vec<&[Value]> = items.chunks(batch_size.max(1)).collect();

        let mut statements = Vec::new();
        if let Some(node) = &self.node {
            for chunk in &chunks {
                statements.push(self.statement(Plan::MergeNodes(node.clone()), chunk));
            }
        }
        for rel in &self.relationships {
            for chunk in &chunks {
                statements.push(self.statement(Plan::MergeRelationships(rel.clone()), chunk));
            }
        }
        Ok(statements)
    }

    fn statement(&self, plan: Plan, chunk: &[Value]) -> Statement {
        Statement::new(plan)
            .with_params(&self.bound)
            .with_param(BATCH_PARAM, Value::Array(chunk.to_vec()))
    }
}

pub(crate) fn add_field(
    fields: &mut BTreeMap<String, FieldSpec>,
    reference: &PropertyRef,
    required: bool,
) {
    if !reference.is_record() {
        return;
    }
    let spec = fields.entry(reference.name.clone()).or_insert_with(|| FieldSpec {
        reference: reference.clone(),
        required: false,
        list: false,
    });
    spec.required |= required;
    spec.list |= reference.one_to_many;
}

/// Look up every batch parameter the references read.
pub(crate) fn bind_params<'a>(
    schema: &str,
    references: impl Iterator<Item = &'a PropertyRef>,
    params: &Params,
) -> SchemaResult<BTreeMap<String, Value>> {
    let mut bound = BTreeMap::new();
    for reference in references.filter(|r| r.is_param()) {
        let value = params
            .get(&reference.name)
            .ok_or_else(|| SchemaError::MissingParameter {
                schema: schema.to_string(),
                name: reference.name.clone(),
            })?;
        check_property_value(value).map_err(|reason| SchemaError::InvalidParameter {
            name: reference.name.clone(),
            reason,
        })?;
        bound.insert(reference.name.clone(), value.clone());
    }
    Ok(bound)
}

pub(crate) fn merge_relationship(
    source: NodePattern,
    rel: &RelSchema,
    extra: Vec<Assignment>,
) -> MergeRelationships {
    let mut properties: Vec<Assignment> = rel
        .properties
        .iter()
        .map(|(name, reference)| Assignment::new(name.clone(), Operand::from_ref(reference)))
        .collect();
    properties.extend(extra);
    MergeRelationships {
        source,
        target: NodePattern::matcher(&rel.target_label, &rel.target_matcher),
        rel_label: rel.rel_label.clone(),
        direction: rel.direction,
        fan_out: rel.one_to_many().map(|(_, reference)| reference.name.clone()),
        properties,
    }
}
