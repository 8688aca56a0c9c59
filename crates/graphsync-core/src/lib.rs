//! # graphsync core
//!
//! Declarative schema layer for loading provider data into a property graph.
//!
//! Node and relationship schemas are plain values; the `graphsync-graph`
//! crate compiles them into batched upsert and cleanup statements.

pub mod error;
pub mod file;
pub mod node;
pub mod property;
pub mod relationship;
pub mod value;

pub use error::{SchemaError, SchemaResult};
pub use node::{NodeSchema, ID};
pub use property::{escape_identifier, PropertyRef, PropertySource, Unresolved};
pub use relationship::{Direction, RelSchema};
pub use value::{
    check_property_value, Params, Record, SubResource, UpdateTag, LASTUPDATED, SUB_RESOURCE_ID,
    SUB_RESOURCE_LABEL,
};
