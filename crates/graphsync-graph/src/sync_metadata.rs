//! Records that a module finished syncing a tenant.
//!
//! Downstream jobs read `ModuleSyncMetadata` nodes to tell whether the data
//! they depend on was refreshed in the current run.

use graphsync_core::{NodeSchema, Params, PropertyRef, Record, UpdateTag};
use serde_json::Value;

use crate::error::GraphResult;
use crate::load::{load, LoadSummary};
use crate::session::GraphSession;

pub const MODULE_SYNC_METADATA: &str = "ModuleSyncMetadata";

pub fn module_sync_metadata_schema() -> NodeSchema {
    NodeSchema::new(MODULE_SYNC_METADATA)
        .property("id", PropertyRef::record("id"))
        .property("syncedtype", PropertyRef::record("syncedtype"))
        .property("grouptype", PropertyRef::record("grouptype"))
        .property("groupid", PropertyRef::record("groupid"))
        .extra_label("SyncMetadata")
        .unscoped()
}

/// Mark `synced_type` as synced for the group `(group_type, group_id)`.
pub async fn merge_module_sync_metadata(
    session: &dyn GraphSession,
    group_type: &str,
    group_id: impl Into<Value>,
    synced_type: &str,
    update_tag: UpdateTag,
) -> GraphResult<LoadSummary> {
    let group_id = group_id.into();
    let id = match &group_id {
        Value::String(s) => format!("{group_type}_{s}_{synced_type}"),
        other => format!("{group_type}_{other}_{synced_type}"),
    };

    let mut record = Record::new();
    record.insert("id".to_string(), Value::from(id));
    record.insert("syncedtype".to_string(), Value::from(synced_type));
    record.insert("grouptype".to_string(), Value::from(group_type));
    record.insert("groupid".to_string(), group_id);

    load(session, &module_sync_metadata_schema(), &[record], &Params::new(update_tag)).await
}
