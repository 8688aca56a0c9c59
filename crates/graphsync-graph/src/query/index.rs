//! Index statements derived from schemas.
//!
//! Every label is indexed on `id` and `lastupdated`; properties flagged
//! `extra_index` and every matcher property of a relationship target (or
//! MatchLink source) get an index too, since MATCH looks them up per item.

use std::collections::BTreeSet;

use graphsync_core::{NodeSchema, RelSchema, ID, LASTUPDATED};

use crate::plan::{CreateIndex, Plan};

fn into_plans(indexes: BTreeSet<(String, String)>) -> Vec<Plan> {
    indexes
        .into_iter()
        .map(|(label, property)| Plan::CreateIndex(CreateIndex { label, property }))
        .collect()
}

fn relationship_indexes(rel: &RelSchema, indexes: &mut BTreeSet<(String, String)>) {
    for property in rel.target_matcher.keys() {
        indexes.insert((rel.target_label.clone(), property.clone()));
    }
    if let Some(source) = &rel.source_label {
        for property in rel.source_matcher.keys() {
            indexes.insert((source.clone(), property.clone()));
        }
    }
}

/// Indexes a node schema needs.
pub fn build_index_plans(schema: &NodeSchema) -> Vec<Plan> {
    let mut indexes = BTreeSet::new();
    indexes.insert((schema.label.clone(), ID.to_string()));
    indexes.insert((schema.label.clone(), LASTUPDATED.to_string()));
    for (name, reference) in &schema.properties {
        if reference.extra_index {
            indexes.insert((schema.label.clone(), name.clone()));
        }
    }
    for rel in schema.relationships() {
        relationship_indexes(rel, &mut indexes);
    }
    into_plans(indexes)
}

/// Indexes a MatchLink schema needs.
pub fn build_matchlink_index_plans(rel: &RelSchema) -> Vec<Plan> {
    let mut indexes = BTreeSet::new();
    relationship_indexes(rel, &mut indexes);
    into_plans(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::{Direction, PropertyRef};

    #[test]
    fn test_node_indexes() {
        let schema = NodeSchema::new("User")
            .property("id", PropertyRef::record("id"))
            .property("email", PropertyRef::record("email").extra_index())
            .property("name", PropertyRef::record("name"))
            .sub_resource(
                RelSchema::new("RESOURCE", "Org", Direction::Inward)
                    .match_target("id", PropertyRef::param("ORG_ID")),
            );
        let cypher: Vec<String> = build_index_plans(&schema).iter().map(Plan::to_cypher).collect();
        assert_eq!(
            cypher,
            vec![
                "CREATE INDEX IF NOT EXISTS FOR (n:Org) ON (n.id)",
                "CREATE INDEX IF NOT EXISTS FOR (n:User) ON (n.email)",
                "CREATE INDEX IF NOT EXISTS FOR (n:User) ON (n.id)",
                "CREATE INDEX IF NOT EXISTS FOR (n:User) ON (n.lastupdated)",
            ]
        );
    }

    #[test]
    fn test_matchlink_indexes() {
        let rel = RelSchema::new("ASSUMES", "Role", Direction::Outward)
            .from_source("Principal")
            .match_source("arn", PropertyRef::record("principal_arn"))
            .match_target("arn", PropertyRef::record("role_arn"));
        let plans = build_matchlink_index_plans(&rel);
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|p| !p.returns_count()));
    }
}
