//! Node schemas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::property::{check_name, PropertyRef};
use crate::relationship::RelSchema;
use crate::value::LASTUPDATED;

/// Property every node is merged on.
pub const ID: &str = "id";

fn default_true() -> bool {
    true
}

/// Declarative description of one graph entity type.
///
/// `properties` must contain `id` (the merge key) and `lastupdated` read from
/// the batch parameters. `sub_resource_relationship` points at the tenant the
/// node belongs to; with `scoped_cleanup` (the default) stale-data removal
/// only looks at nodes attached to that tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSchema {
    pub label: String,
    pub properties: BTreeMap<String, PropertyRef>,
    #[serde(default)]
    pub sub_resource_relationship: Option<RelSchema>,
    #[serde(default)]
    pub other_relationships: Vec<RelSchema>,
    #[serde(default)]
    pub extra_labels: Vec<String>,
    #[serde(default = "default_true")]
    pub scoped_cleanup: bool,
}

impl NodeSchema {
    /// Create a schema whose `lastupdated` comes from the batch parameters.
    pub fn new(label: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(LASTUPDATED.to_string(), PropertyRef::param(LASTUPDATED));
        Self {
            label: label.into(),
            properties,
            sub_resource_relationship: None,
            other_relationships: Vec::new(),
            extra_labels: Vec::new(),
            scoped_cleanup: true,
        }
    }

    pub fn property(mut self, name: impl Into<String>, reference: PropertyRef) -> Self {
        self.properties.insert(name.into(), reference);
        self
    }

    pub fn sub_resource(mut self, relationship: RelSchema) -> Self {
        self.sub_resource_relationship = Some(relationship);
        self
    }

    pub fn relationship(mut self, relationship: RelSchema) -> Self {
        self.other_relationships.push(relationship);
        self
    }

    pub fn extra_label(mut self, label: impl Into<String>) -> Self {
        self.extra_labels.push(label.into());
        self
    }

    /// Clean up across the whole label space instead of per tenant.
    pub fn unscoped(mut self) -> Self {
        self.scoped_cleanup = false;
        self
    }

    /// The reference feeding the `id` merge key.
    pub fn id_ref(&self) -> Option<&PropertyRef> {
        self.properties.get(ID)
    }

    /// Sub-resource relationship first, then the others in declaration order.
    pub fn relationships(&self) -> impl Iterator<Item = &RelSchema> {
        self.sub_resource_relationship
            .iter()
            .chain(self.other_relationships.iter())
    }

    /// Every reference the schema reads, including its relationships.
    pub fn references(&self) -> impl Iterator<Item = &PropertyRef> {
        self.properties
            .values()
            .chain(self.relationships().flat_map(|rel| rel.references()))
    }

    pub fn validate(&self) -> SchemaResult<()> {
        let invalid = |reason: String| SchemaError::invalid(self.label.clone(), reason);

        check_name("label", &self.label).map_err(invalid)?;
        for label in &self.extra_labels {
            check_name("extra label", label).map_err(invalid)?;
        }
        for (name, reference) in &self.properties {
            check_name("property", name).map_err(invalid)?;
            check_name("reference", &reference.name).map_err(invalid)?;
            if reference.one_to_many {
                return Err(invalid(format!("node property '{name}' cannot be one_to_many")));
            }
        }

        match self.id_ref() {
            Some(r) if r.is_record() => {}
            Some(_) => return Err(invalid("'id' must come from a record field".to_string())),
            None => return Err(invalid("properties must include 'id'".to_string())),
        }
        match self.properties.get(LASTUPDATED) {
            Some(r) if r.is_param() => {}
            Some(_) => {
                return Err(invalid(
                    "'lastupdated' must come from the batch parameters".to_string(),
                ))
            }
            None => return Err(invalid("properties must include 'lastupdated'".to_string())),
        }

        if let Some(rel) = &self.sub_resource_relationship {
            if rel.one_to_many().is_some() {
                return Err(invalid(
                    "the sub-resource relationship must point at exactly one tenant".to_string(),
                ));
            }
        }
        for rel in self.relationships() {
            if rel.is_matchlink() {
                return Err(invalid(format!(
                    "{} declares a source; MatchLinks are loaded with load_matchlinks",
                    rel.describe()
                )));
            }
            rel.validate(&self.label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::Direction;

    fn child_schema() -> NodeSchema {
        NodeSchema::new("Child")
            .property("id", PropertyRef::record("id"))
            .property("name", PropertyRef::record("name"))
            .sub_resource(
                RelSchema::new("RESOURCE", "Tenant", Direction::Inward)
                    .match_target("id", PropertyRef::record("tenant_id")),
            )
    }

    #[test]
    fn test_valid_schema() {
        let schema = child_schema();
        assert!(schema.validate().is_ok());
        assert!(schema.scoped_cleanup);
        assert_eq!(schema.relationships().count(), 1);
    }

    #[test]
    fn test_id_required() {
        let schema = NodeSchema::new("Thing").property("name", PropertyRef::record("name"));
        let err = schema.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_id_must_be_record_field() {
        let schema = NodeSchema::new("Thing").property("id", PropertyRef::param("ID"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_lastupdated_required() {
        let mut schema = child_schema();
        schema.properties.remove(LASTUPDATED);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_node_property_one_to_many_rejected() {
        let schema = child_schema().property("tags", PropertyRef::record("tags").one_to_many());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_matchlink_relationship_rejected_on_node() {
        let schema = child_schema().relationship(
            RelSchema::new("LINKS", "Other", Direction::Outward)
                .match_target("id", PropertyRef::record("other"))
                .from_source("Child")
                .match_source("id", PropertyRef::record("id")),
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let schema: NodeSchema = serde_json::from_str(
            r#"{
                "label": "Vuln",
                "properties": {
                    "id": {"name": "cve"},
                    "lastupdated": {"name": "lastupdated", "source": "params"}
                }
            }"#,
        )
        .unwrap();
        assert!(schema.scoped_cleanup);
        assert!(schema.extra_labels.is_empty());
        assert!(schema.validate().is_ok());
    }
}
