//! Relationship schemas.
//!
//! A [`RelSchema`] describes one edge type. Targets are always located with
//! MATCH; a relationship never creates the nodes it connects. When
//! `source_label`/`source_matcher` are set the schema is a MatchLink: it links
//! two node sets that were loaded independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::property::{check_name, PropertyRef};
use crate::value::{LASTUPDATED, SUB_RESOURCE_ID, SUB_RESOURCE_LABEL};

/// Edge direction relative to the source node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `(source)-[r]->(target)`
    #[default]
    Outward,
    /// `(source)<-[r]-(target)`
    Inward,
}

/// Declarative description of one edge type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelSchema {
    pub rel_label: String,
    pub target_label: String,
    pub target_matcher: BTreeMap<String, PropertyRef>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyRef>,
    #[serde(default)]
    pub source_label: Option<String>,
    #[serde(default)]
    pub source_matcher: BTreeMap<String, PropertyRef>,
}

impl RelSchema {
    /// Create a relationship stamped with `lastupdated` from the batch parameters.
    pub fn new(
        rel_label: impl Into<String>,
        target_label: impl Into<String>,
        direction: Direction,
    ) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(LASTUPDATED.to_string(), PropertyRef::param(LASTUPDATED));
        Self {
            rel_label: rel_label.into(),
            target_label: target_label.into(),
            target_matcher: BTreeMap::new(),
            direction,
            properties,
            source_label: None,
            source_matcher: BTreeMap::new(),
        }
    }

    /// Add a target matcher entry: `target.<property>` must equal the reference.
    pub fn match_target(mut self, property: impl Into<String>, reference: PropertyRef) -> Self {
        self.target_matcher.insert(property.into(), reference);
        self
    }

    /// Add an edge property.
    pub fn property(mut self, name: impl Into<String>, reference: PropertyRef) -> Self {
        self.properties.insert(name.into(), reference);
        self
    }

    /// Anchor the relationship on an independently loaded source node set.
    pub fn from_source(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    /// Add a source matcher entry (MatchLink only).
    pub fn match_source(mut self, property: impl Into<String>, reference: PropertyRef) -> Self {
        self.source_matcher.insert(property.into(), reference);
        self
    }

    pub fn is_matchlink(&self) -> bool {
        self.source_label.is_some()
    }

    /// Human-readable name used in errors and logs.
    pub fn describe(&self) -> String {
        let source = self.source_label.as_deref().unwrap_or("_");
        let (rel, target) = (&self.rel_label, &self.target_label);
        match self.direction {
            Direction::Outward => format!("({source})-[:{rel}]->({target})"),
            Direction::Inward => format!("({source})<-[:{rel}]-({target})"),
        }
    }

    /// The one-to-many target matcher entry, if any.
    pub fn one_to_many(&self) -> Option<(&String, &PropertyRef)> {
        self.target_matcher.iter().find(|(_, r)| r.one_to_many)
    }

    /// Every reference this relationship reads.
    pub fn references(&self) -> impl Iterator<Item = &PropertyRef> {
        self.target_matcher
            .values()
            .chain(self.properties.values())
            .chain(self.source_matcher.values())
    }

    /// Validate the relationship as attached to a node schema named `owner`.
    pub fn validate(&self, owner: &str) -> SchemaResult<()> {
        let name = format!("{owner} {}", self.describe());
        let invalid = |reason: String| SchemaError::invalid(name.clone(), reason);

        check_name("relationship label", &self.rel_label).map_err(invalid)?;
        check_name("target label", &self.target_label).map_err(invalid)?;

        if self.target_matcher.is_empty() {
            return Err(invalid("target matcher must not be empty".to_string()));
        }
        for (property, reference) in self.references_with_keys() {
            check_name("property", property).map_err(invalid)?;
            check_name("reference", &reference.name).map_err(invalid)?;
        }

        let one_to_many = self.target_matcher.values().filter(|r| r.one_to_many).count();
        if one_to_many > 1 {
            return Err(invalid("at most one target matcher entry may be one_to_many".to_string()));
        }
        if self.target_matcher.values().any(|r| r.one_to_many && r.is_param()) {
            return Err(invalid("one_to_many references must read a record field".to_string()));
        }
        if self.properties.values().chain(self.source_matcher.values()).any(|r| r.one_to_many) {
            return Err(invalid("one_to_many is only valid in the target matcher".to_string()));
        }

        match self.properties.get(LASTUPDATED) {
            Some(r) if r.is_param() => {}
            Some(_) => {
                return Err(invalid(
                    "'lastupdated' must come from the batch parameters".to_string(),
                ))
            }
            None => {
                return Err(invalid(
                    "relationship properties must include 'lastupdated'".to_string(),
                ))
            }
        }
        if self.properties.contains_key(SUB_RESOURCE_LABEL)
            || self.properties.contains_key(SUB_RESOURCE_ID)
        {
            return Err(invalid(format!(
                "'{SUB_RESOURCE_LABEL}' and '{SUB_RESOURCE_ID}' are stamped by the loader"
            )));
        }

        if let Some(source) = &self.source_label {
            check_name("source label", source).map_err(invalid)?;
        } else if !self.source_matcher.is_empty() {
            return Err(invalid("source matcher requires a source label".to_string()));
        }
        Ok(())
    }

    /// Validate the relationship for MatchLink loading and cleanup.
    pub fn validate_matchlink(&self) -> SchemaResult<()> {
        self.validate("matchlink")?;
        if self.source_label.is_none() || self.source_matcher.is_empty() {
            return Err(SchemaError::invalid(
                self.describe(),
                "a MatchLink needs both a source label and a source matcher",
            ));
        }
        Ok(())
    }

    fn references_with_keys(&self) -> impl Iterator<Item = (&String, &PropertyRef)> {
        self.target_matcher
            .iter()
            .chain(self.properties.iter())
            .chain(self.source_matcher.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_rel() -> RelSchema {
        RelSchema::new("RESOURCE", "Tenant", Direction::Inward)
            .match_target("id", PropertyRef::param("TENANT_ID"))
    }

    #[test]
    fn test_new_stamps_lastupdated() {
        let rel = tenant_rel();
        assert_eq!(rel.properties.get(LASTUPDATED), Some(&PropertyRef::param(LASTUPDATED)));
        assert!(rel.validate("Child").is_ok());
        assert!(!rel.is_matchlink());
    }

    #[test]
    fn test_empty_target_matcher_rejected() {
        let rel = RelSchema::new("RESOURCE", "Tenant", Direction::Inward);
        let err = rel.validate("Child").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_one_to_many_rules() {
        let rel = RelSchema::new("MEMBER_OF", "Group", Direction::Outward)
            .match_target("id", PropertyRef::record("group_ids").one_to_many())
            .match_target("name", PropertyRef::record("group_names").one_to_many());
        assert!(rel.validate("User").is_err());

        let rel = RelSchema::new("MEMBER_OF", "Group", Direction::Outward)
            .match_target("id", PropertyRef::param("GROUP").one_to_many());
        assert!(rel.validate("User").is_err());

        let rel = RelSchema::new("MEMBER_OF", "Group", Direction::Outward)
            .match_target("id", PropertyRef::record("group_ids").one_to_many());
        assert!(rel.validate("User").is_ok());
        assert_eq!(rel.one_to_many().map(|(k, _)| k.as_str()), Some("id"));
    }

    #[test]
    fn test_lastupdated_must_be_param() {
        let rel = tenant_rel().property(LASTUPDATED, PropertyRef::record("ts"));
        assert!(rel.validate("Child").is_err());
    }

    #[test]
    fn test_matchlink_requires_source() {
        let rel = RelSchema::new("ASSUMES", "Role", Direction::Outward)
            .match_target("arn", PropertyRef::record("role_arn"));
        assert!(rel.validate_matchlink().is_err());

        let rel = rel
            .from_source("Principal")
            .match_source("arn", PropertyRef::record("principal_arn"));
        assert!(rel.validate_matchlink().is_ok());
        assert!(rel.is_matchlink());
        assert_eq!(rel.describe(), "(Principal)-[:ASSUMES]->(Role)");
    }

    #[test]
    fn test_deserialize_from_toml() {
        let rel: RelSchema = toml::from_str(
            r#"
            rel_label = "RESOURCE"
            target_label = "Tenant"
            direction = "inward"

            [target_matcher.id]
            name = "TENANT_ID"
            source = "params"

            [properties.lastupdated]
            name = "lastupdated"
            source = "params"
            "#,
        )
        .unwrap();
        assert_eq!(rel, tenant_rel());
    }
}
