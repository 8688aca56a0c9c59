//! Statement builders.
//!
//! - `ingest` / `matchlink`: batched upserts for a load call
//! - `cleanup`: stale node and edge deletion
//! - `index`: `CREATE INDEX IF NOT EXISTS` statements

pub mod cleanup;
pub mod index;
pub mod ingest;
pub mod matchlink;

pub use cleanup::{build_cleanup_plans, build_matchlink_cleanup_plan, cleanup_params};
pub use index::{build_index_plans, build_matchlink_index_plans};
pub use ingest::{compile_node_ingestion, IngestionPlan};
pub use matchlink::compile_matchlink_ingestion;
