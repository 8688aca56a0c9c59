//! Records, batch parameters and update tags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, SchemaResult};

/// One flat input record produced by a provider's transform step.
pub type Record = serde_json::Map<String, Value>;

/// Batch parameter holding the update tag of the current run.
pub const LASTUPDATED: &str = "lastupdated";

/// Edge property naming the tenant label a MatchLink edge was loaded under.
pub const SUB_RESOURCE_LABEL: &str = "_sub_resource_label";

/// Edge property naming the tenant id a MatchLink edge was loaded under.
pub const SUB_RESOURCE_ID: &str = "_sub_resource_id";

/// Staleness marker for one sync run.
///
/// Every node and edge written during a run is stamped with the tag; cleanup
/// deletes whatever in scope carries a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateTag(i64);

impl UpdateTag {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Tag for a run starting now (epoch seconds).
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UpdateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UpdateTag {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<UpdateTag> for Value {
    fn from(tag: UpdateTag) -> Self {
        Value::from(tag.0)
    }
}

/// Batch-wide parameters shared by every record of a load or cleanup call.
///
/// Always carries [`LASTUPDATED`]. Other entries are typically tenant ids
/// referenced by `PropertyRef::param`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new(update_tag: impl Into<UpdateTag>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(LASTUPDATED.to_string(), update_tag.into().into());
        Self { values }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// The update tag of the run these parameters belong to.
    ///
    /// Parameters read from a file may lack the tag or carry a non-integer
    /// value; both are configuration errors.
    pub fn update_tag(&self) -> SchemaResult<UpdateTag> {
        match self.values.get(LASTUPDATED) {
            Some(value) => value
                .as_i64()
                .map(UpdateTag)
                .ok_or_else(|| SchemaError::InvalidParameter {
                    name: LASTUPDATED.to_string(),
                    reason: format!("expected an integer update tag, got {value}"),
                }),
            None => Err(SchemaError::MissingParameter {
                schema: "<params>".to_string(),
                name: LASTUPDATED.to_string(),
            }),
        }
    }
}

/// The tenant a MatchLink load or cleanup is scoped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub label: String,
    pub id: Value,
}

impl SubResource {
    pub fn new(label: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
        }
    }
}

/// Check that a value can be stored as a graph property.
///
/// Properties are scalars or flat lists of non-null scalars of one type.
/// Returns the reason on rejection so callers can attach record/field context.
pub fn check_property_value(value: &Value) -> Result<(), String> {
    match value {
        Value::Object(_) => Err("nested objects cannot be stored as properties".to_string()),
        Value::Array(items) => {
            let mut kinds = items.iter().map(scalar_kind);
            let first = match kinds.next() {
                None => return Ok(()),
                Some(kind) => kind?,
            };
            for kind in kinds {
                if kind? != first {
                    return Err(format!("lists must not mix types, found {first} and others"));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Storage type of a list element.
fn scalar_kind(value: &Value) -> Result<&'static str, String> {
    match value {
        Value::Null => Err("lists must not contain null".to_string()),
        Value::Bool(_) => Ok("boolean"),
        Value::Number(n) if n.is_f64() => Ok("float"),
        Value::Number(_) => Ok("integer"),
        Value::String(_) => Ok("string"),
        Value::Array(_) | Value::Object(_) => {
            Err("lists may only contain scalar values".to_string())
        }
    }
}
