//! Property references: where a schema property gets its value from.
//!
//! A [`PropertyRef`] either points at a field of each input record or at a
//! batch parameter shared by the whole call. The query builder renders it as
//! `item.<field>` or `$<param>` respectively.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::value::{Params, Record};

/// Where a property value is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertySource {
    /// A field of each input record.
    #[default]
    Record,
    /// A batch parameter, identical for every record.
    Params,
}

/// A reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unresolved {
    #[error("record field '{0}' is absent")]
    Field(String),
    #[error("batch parameter '{0}' is absent")]
    Param(String),
}

/// Indirection between a schema property and its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub name: String,
    #[serde(default)]
    pub source: PropertySource,
    /// Request a secondary index on the property this reference feeds.
    #[serde(default)]
    pub extra_index: bool,
    /// The record field holds a list of target keys, one edge per element.
    #[serde(default)]
    pub one_to_many: bool,
    /// Match the target property case-insensitively.
    #[serde(default)]
    pub ignore_case: bool,
    /// Match when the target property contains the value, case-insensitively.
    #[serde(default)]
    pub fuzzy_and_ignore_case: bool,
    /// Fail the batch when a record lacks this field.
    #[serde(default)]
    pub required: bool,
}

impl PropertyRef {
    fn new(name: impl Into<String>, source: PropertySource) -> Self {
        Self {
            name: name.into(),
            source,
            extra_index: false,
            one_to_many: false,
            ignore_case: false,
            fuzzy_and_ignore_case: false,
            required: false,
        }
    }

    /// Reference to a field of each input record.
    pub fn record(name: impl Into<String>) -> Self {
        Self::new(name, PropertySource::Record)
    }

    /// Reference to a batch parameter.
    pub fn param(name: impl Into<String>) -> Self {
        Self::new(name, PropertySource::Params)
    }

    pub fn extra_index(mut self) -> Self {
        self.extra_index = true;
        self
    }

    pub fn one_to_many(mut self) -> Self {
        self.one_to_many = true;
        self
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn fuzzy_and_ignore_case(mut self) -> Self {
        self.fuzzy_and_ignore_case = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_param(&self) -> bool {
        self.source == PropertySource::Params
    }

    pub fn is_record(&self) -> bool {
        self.source == PropertySource::Record
    }

    /// Resolve the value for one record.
    pub fn resolve<'a>(
        &self,
        record: &'a Record,
        params: &'a Params,
    ) -> Result<&'a Value, Unresolved> {
        match self.source {
            PropertySource::Record => record
                .get(&self.name)
                .ok_or_else(|| Unresolved::Field(self.name.clone())),
            PropertySource::Params => params
                .get(&self.name)
                .ok_or_else(|| Unresolved::Param(self.name.clone())),
        }
    }

    /// Cypher expression reading this reference inside an `UNWIND ... AS item` batch.
    pub fn cypher_expr(&self) -> String {
        match self.source {
            PropertySource::Record => format!("item.{}", escape_identifier(&self.name)),
            PropertySource::Params => format!("${}", escape_identifier(&self.name)),
        }
    }
}

/// Quote a label, property or parameter name for Cypher when it is not a plain identifier.
pub fn escape_identifier(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{name}`"))
    }
}

/// Reject names that cannot be quoted safely.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{kind} name must not be empty"));
    }
    if name.contains('`') || name.chars().any(char::is_control) {
        return Err(format!("{kind} name '{name}' contains a backtick or control character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::UpdateTag;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_resolve_record_field() {
        let rec = record(json!({"Arn": "arn:1", "Name": "web"}));
        let params = Params::new(UpdateTag::new(1));
        assert_eq!(PropertyRef::record("Arn").resolve(&rec, &params), Ok(&json!("arn:1")));
        assert_eq!(
            PropertyRef::record("Missing").resolve(&rec, &params),
            Err(Unresolved::Field("Missing".to_string()))
        );
    }

    #[test]
    fn test_resolve_param() {
        let rec = Record::new();
        let params = Params::new(UpdateTag::new(1)).with("TENANT_ID", "t1");
        assert_eq!(PropertyRef::param("TENANT_ID").resolve(&rec, &params), Ok(&json!("t1")));
        assert_eq!(
            PropertyRef::param("OTHER").resolve(&rec, &params),
            Err(Unresolved::Param("OTHER".to_string()))
        );
    }

    #[test]
    fn test_cypher_expr() {
        assert_eq!(PropertyRef::record("id").cypher_expr(), "item.id");
        assert_eq!(PropertyRef::param("lastupdated").cypher_expr(), "$lastupdated");
        assert_eq!(PropertyRef::record("tenant-id").cypher_expr(), "item.`tenant-id`");
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("AWSAccount"), "AWSAccount");
        assert_eq!(escape_identifier("_private1"), "_private1");
        assert_eq!(escape_identifier("1abc"), "`1abc`");
        assert_eq!(escape_identifier("has space"), "`has space`");
    }

    #[test]
    fn test_deserialize_defaults() {
        let prop: PropertyRef =
            serde_json::from_value(json!({"name": "Email", "ignore_case": true})).unwrap();
        assert_eq!(prop.source, PropertySource::Record);
        assert!(prop.ignore_case);
        assert!(!prop.one_to_many);

        let prop: PropertyRef =
            serde_json::from_value(json!({"name": "TENANT_ID", "source": "params"})).unwrap();
        assert!(prop.is_param());
    }
}
