//! Reading schema declarations from TOML or JSON files.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::SchemaResult;
use crate::node::NodeSchema;
use crate::relationship::RelSchema;
use crate::value::{Params, Record};

/// Parse a TOML or JSON document, chosen by the file extension (JSON otherwise).
fn read_document<T: DeserializeOwned>(path: &Path) -> SchemaResult<T> {
    let content = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        Ok(toml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Read and validate a node schema.
pub fn read_node_schema(path: &Path) -> SchemaResult<NodeSchema> {
    let schema: NodeSchema = read_document(path)?;
    schema.validate()?;
    Ok(schema)
}

/// Read and validate a MatchLink relationship schema.
pub fn read_matchlink_schema(path: &Path) -> SchemaResult<RelSchema> {
    let schema: RelSchema = read_document(path)?;
    schema.validate_matchlink()?;
    Ok(schema)
}

/// Read batch parameters (a flat map).
pub fn read_params(path: &Path) -> SchemaResult<Params> {
    read_document(path)
}

/// Read a JSON array of flat records.
pub fn read_records(path: &Path) -> SchemaResult<Vec<Record>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("graphsync-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_node_schema_toml() {
        let path = write_temp(
            "child.toml",
            r#"
            label = "Child"
            extra_labels = ["Asset"]

            [properties.id]
            name = "id"

            [properties.lastupdated]
            name = "lastupdated"
            source = "params"

            [sub_resource_relationship]
            rel_label = "RESOURCE"
            target_label = "Tenant"
            direction = "inward"

            [sub_resource_relationship.target_matcher.id]
            name = "TENANT_ID"
            source = "params"

            [sub_resource_relationship.properties.lastupdated]
            name = "lastupdated"
            source = "params"
            "#,
        );
        let schema = read_node_schema(&path).unwrap();
        assert_eq!(schema.label, "Child");
        assert_eq!(schema.extra_labels, vec!["Asset".to_string()]);
        assert!(schema.sub_resource_relationship.is_some());
    }

    #[test]
    fn test_read_invalid_schema_fails_validation() {
        let path = write_temp(
            "broken.json",
            r#"{"label": "Broken", "properties": {"name": {"name": "name"}}}"#,
        );
        let err = read_node_schema(&path).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_read_records_and_params() {
        let records = write_temp(
            "records.json",
            r#"[{"id": "c1", "tenant_id": "t1"}, {"id": "c2"}]"#,
        );
        let params = write_temp("params.json", r#"{"lastupdated": 42, "TENANT_ID": "t1"}"#);
        assert_eq!(read_records(&records).unwrap().len(), 2);
        assert_eq!(read_params(&params).unwrap().update_tag().unwrap().value(), 42);
    }
}
