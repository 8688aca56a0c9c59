//! Cleanup statements: delete what the current run did not touch.
//!
//! A node or edge is stale when its `lastupdated` differs from the run's
//! update tag. Scoped cleanup only looks at nodes hanging off one tenant, so
//! a sweep for one tenant cannot remove another tenant's data.
//!
//! The tenant is identified through the sub-resource relationship's target
//! matcher. Whether a matcher reads a record field or a batch parameter while
//! loading, cleanup always reads it from the batch parameters under the
//! referenced name.

use std::collections::BTreeMap;

use graphsync_core::{NodeSchema, Params, PropertyRef, RelSchema, SchemaError, SchemaResult};
use serde_json::Value;

use super::ingest::bind_params;
use crate::plan::{Condition, DeleteNodes, DeleteRelationships, NodePattern, Operand, Plan, Scope};

/// Cleanup plans for a node schema, in execution order.
///
/// Stale nodes go first (detaching their edges), then stale edges of the
/// nodes that survived.
pub fn build_cleanup_plans(schema: &NodeSchema) -> SchemaResult<Vec<Plan>> {
    schema.validate()?;
    let mut plans = Vec::new();

    if schema.scoped_cleanup {
        let scope = cleanup_scope(schema)?;
        plans.push(Plan::DeleteNodes(DeleteNodes {
            label: schema.label.clone(),
            scope: Some(scope.clone()),
        }));
        plans.push(Plan::DeleteRelationships(DeleteRelationships {
            source_label: schema.label.clone(),
            scope: None,
            rel_label: scope.rel_label.clone(),
            direction: scope.direction,
            target: scope.tenant.clone(),
            tagged: false,
        }));
        for rel in &schema.other_relationships {
            plans.push(Plan::DeleteRelationships(DeleteRelationships {
                source_label: schema.label.clone(),
                scope: Some(scope.clone()),
                rel_label: rel.rel_label.clone(),
                direction: rel.direction,
                target: NodePattern::labelled(&rel.target_label),
                tagged: false,
            }));
        }
    } else {
        plans.push(Plan::DeleteNodes(DeleteNodes {
            label: schema.label.clone(),
            scope: None,
        }));
        for rel in schema.relationships() {
            plans.push(Plan::DeleteRelationships(DeleteRelationships {
                source_label: schema.label.clone(),
                scope: None,
                rel_label: rel.rel_label.clone(),
                direction: rel.direction,
                target: NodePattern::labelled(&rel.target_label),
                tagged: false,
            }));
        }
    }
    Ok(plans)
}

/// Cleanup plan for the edges of a MatchLink schema loaded under one tenant.
pub fn build_matchlink_cleanup_plan(rel: &RelSchema) -> SchemaResult<Plan> {
    rel.validate_matchlink()?;
    let source_label = rel
        .source_label
        .clone()
        .ok_or_else(|| SchemaError::invalid(rel.describe(), "a MatchLink needs a source label"))?;
    Ok(Plan::DeleteRelationships(DeleteRelationships {
        source_label,
        scope: None,
        rel_label: rel.rel_label.clone(),
        direction: rel.direction,
        target: NodePattern::labelled(&rel.target_label),
        tagged: true,
    }))
}

/// Batch parameters the scope of a node schema's cleanup reads.
///
/// Empty for unscoped schemas.
pub fn cleanup_params(
    schema: &NodeSchema,
    params: &Params,
) -> SchemaResult<BTreeMap<String, Value>> {
    if !schema.scoped_cleanup {
        return Ok(BTreeMap::new());
    }
    let rel = scope_relationship(schema)?;
    let references: Vec<PropertyRef> = rel
        .target_matcher
        .values()
        .map(|reference| PropertyRef::param(reference.name.clone()))
        .collect();
    bind_params(&schema.label, references.iter(), params)
}

fn scope_relationship(schema: &NodeSchema) -> SchemaResult<&RelSchema> {
    schema.sub_resource_relationship.as_ref().ok_or_else(|| {
        SchemaError::invalid(
            schema.label.clone(),
            "scoped cleanup requires a sub-resource relationship; \
             mark the schema unscoped for global data",
        )
    })
}

fn cleanup_scope(schema: &NodeSchema) -> SchemaResult<Scope> {
    let rel = scope_relationship(schema)?;
    let conditions = rel
        .target_matcher
        .iter()
        .map(|(property, reference)| Condition {
            operand: Operand::Param(reference.name.clone()),
            ..Condition::from_matcher(property, reference)
        })
        .collect();
    Ok(Scope {
        rel_label: rel.rel_label.clone(),
        direction: rel.direction,
        tenant: NodePattern {
            label: rel.target_label.clone(),
            conditions,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::{Direction, PropertyRef, UpdateTag};
    use serde_json::json;

    fn scoped_schema() -> NodeSchema {
        NodeSchema::new("Child")
            .property("id", PropertyRef::record("id"))
            .sub_resource(
                RelSchema::new("RESOURCE", "Tenant", Direction::Inward)
                    .match_target("id", PropertyRef::param("TENANT_ID")),
            )
            .relationship(
                RelSchema::new("USES", "Image", Direction::Outward)
                    .match_target("id", PropertyRef::record("image_id")),
            )
    }

    #[test]
    fn test_scoped_cleanup_plans() {
        let plans = build_cleanup_plans(&scoped_schema()).unwrap();
        assert_eq!(plans.len(), 3);

        let node = plans[0].to_cypher();
        assert!(node.starts_with("MATCH (n:Child)<-[:RESOURCE]-(scope:Tenant)"));
        assert!(node.contains("scope.id = $TENANT_ID"));
        assert!(node.contains("DETACH DELETE n"));

        let sub = plans[1].to_cypher();
        assert!(sub.starts_with("MATCH (n:Child)<-[r:RESOURCE]-(t:Tenant)"));
        assert!(sub.contains("t.id = $TENANT_ID"));

        let other = plans[2].to_cypher();
        assert!(other.starts_with(
            "MATCH (n:Child)<-[:RESOURCE]-(scope:Tenant)\nWHERE scope.id = $TENANT_ID\n"
        ));
        assert!(other.contains("MATCH (n)-[r:USES]->(t:Image)"));
        assert!(other.contains("DELETE r"));
    }

    #[test]
    fn test_unscoped_cleanup_plans() {
        let schema = NodeSchema::new("Vuln")
            .property("id", PropertyRef::record("cve"))
            .relationship(
                RelSchema::new("AFFECTS", "Package", Direction::Outward)
                    .match_target("id", PropertyRef::record("package")),
            )
            .unscoped();
        let plans = build_cleanup_plans(&schema).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(
            plans[0],
            Plan::DeleteNodes(DeleteNodes {
                label: "Vuln".to_string(),
                scope: None
            })
        );
        assert!(plans[1].to_cypher().starts_with("MATCH (n:Vuln)-[r:AFFECTS]->(t:Package)"));
        assert!(cleanup_params(&schema, &Params::new(UpdateTag::new(1))).unwrap().is_empty());
    }

    #[test]
    fn test_scoped_without_sub_resource_rejected() {
        let schema = NodeSchema::new("Orphan").property("id", PropertyRef::record("id"));
        let err = build_cleanup_plans(&schema).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_record_keyed_scope_reads_params() {
        let schema = NodeSchema::new("Child")
            .property("id", PropertyRef::record("id"))
            .sub_resource(
                RelSchema::new("RESOURCE", "Tenant", Direction::Inward)
                    .match_target("id", PropertyRef::record("tenant_id")),
            );
        let plans = build_cleanup_plans(&schema).unwrap();
        assert!(plans[0].to_cypher().contains("scope.id = $tenant_id"));
        assert!(plans[1].to_cypher().contains("t.id = $tenant_id"));

        let params = Params::new(UpdateTag::new(2)).with("tenant_id", "t1");
        assert_eq!(cleanup_params(&schema, &params).unwrap().get("tenant_id"), Some(&json!("t1")));
        assert!(cleanup_params(&schema, &Params::new(UpdateTag::new(2))).is_err());
    }

    #[test]
    fn test_cleanup_params() {
        let params = Params::new(UpdateTag::new(5)).with("TENANT_ID", "t1").with("UNRELATED", 1);
        let bound = cleanup_params(&scoped_schema(), &params).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound.get("TENANT_ID"), Some(&json!("t1")));

        let err = cleanup_params(&scoped_schema(), &Params::new(UpdateTag::new(5))).unwrap_err();
        assert!(matches!(err, SchemaError::MissingParameter { .. }));
    }

    #[test]
    fn test_matchlink_cleanup_plan() {
        let rel = RelSchema::new("ASSUMES", "Role", Direction::Outward)
            .from_source("Principal")
            .match_source("arn", PropertyRef::record("principal_arn"))
            .match_target("arn", PropertyRef::record("role_arn"));
        let plan = build_matchlink_cleanup_plan(&rel).unwrap();
        assert!(matches!(
            plan,
            Plan::DeleteRelationships(DeleteRelationships { tagged: true, .. })
        ));
    }
}
