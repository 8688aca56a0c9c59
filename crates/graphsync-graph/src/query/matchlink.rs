//! MatchLink ingestion: connect two node sets that already exist.
//!
//! Only relationship statements are produced. Edges are stamped with the
//! tenant they were loaded under so cleanup can find them without a
//! topological path to the tenant.

use std::collections::BTreeMap;

use graphsync_core::{
    check_property_value, Params, RelSchema, SchemaError, SchemaResult, SubResource,
    SUB_RESOURCE_ID, SUB_RESOURCE_LABEL,
};
use serde_json::Value;

use super::ingest::{add_field, bind_params, merge_relationship, IngestionPlan};
use crate::plan::{Assignment, NodePattern, Operand};

/// Compile a MatchLink relationship schema for loading.
pub fn compile_matchlink_ingestion(
    rel: &RelSchema,
    params: &Params,
    sub_resource: &SubResource,
) -> SchemaResult<IngestionPlan> {
    rel.validate_matchlink()?;
    let name = rel.describe();

    let mut bound = bind_params(&name, rel.references(), params)?;
    bound.extend(sub_resource_params(sub_resource)?);

    let mut fields = BTreeMap::new();
    for reference in rel.references() {
        add_field(&mut fields, reference, reference.required);
    }

    let source_label = rel
        .source_label
        .as_deref()
        .ok_or_else(|| SchemaError::invalid(name.clone(), "a MatchLink needs a source label"))?;
    let source = NodePattern::matcher(source_label, &rel.source_matcher);
    let stamps = vec![
        Assignment::new(SUB_RESOURCE_LABEL, Operand::Param(SUB_RESOURCE_LABEL.to_string())),
        Assignment::new(SUB_RESOURCE_ID, Operand::Param(SUB_RESOURCE_ID.to_string())),
    ];

    Ok(IngestionPlan {
        name,
        node: None,
        relationships: vec![merge_relationship(source, rel, stamps)],
        fields,
        params: params.clone(),
        bound,
    })
}

/// Parameters identifying the tenant a MatchLink belongs to.
pub(crate) fn sub_resource_params(
    sub_resource: &SubResource,
) -> SchemaResult<BTreeMap<String, Value>> {
    if sub_resource.label.is_empty() {
        return Err(SchemaError::InvalidParameter {
            name: SUB_RESOURCE_LABEL.to_string(),
            reason: "sub-resource label must not be empty".to_string(),
        });
    }
    if sub_resource.id.is_null() || sub_resource.id.is_array() {
        return Err(SchemaError::InvalidParameter {
            name: SUB_RESOURCE_ID.to_string(),
            reason: format!("expected a scalar tenant id, got {}", sub_resource.id),
        });
    }
    check_property_value(&sub_resource.id).map_err(|reason| SchemaError::InvalidParameter {
        name: SUB_RESOURCE_ID.to_string(),
        reason,
    })?;

    let mut params = BTreeMap::new();
    params.insert(SUB_RESOURCE_LABEL.to_string(), Value::from(sub_resource.label.clone()));
    params.insert(SUB_RESOURCE_ID.to_string(), sub_resource.id.clone());
    Ok(params)
}
