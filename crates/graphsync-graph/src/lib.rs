//! # graphsync graph
//!
//! Schema-driven ingestion into Neo4j.
//!
//! Provider modules describe their nodes and relationships once as
//! [`NodeSchema`](graphsync_core::NodeSchema) values, then call [`load`]
//! with flat records. Every load stamps the run's update tag; a
//! [`GraphJob`] built from the same schema afterwards deletes whatever the
//! run did not touch.

pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod load;
pub mod memory;
pub mod plan;
pub mod query;
pub mod session;
pub mod sync_metadata;

pub use client::{GraphClient, GraphConfig, GraphCounts};
pub use config::{CleanupOptions, SyncConfig};
pub use error::{GraphError, GraphResult};
pub use job::{GraphJob, GraphStatement, JobSummary};
pub use load::{
    ensure_indexes, ensure_matchlink_indexes, load, load_matchlinks, load_matchlinks_with,
    load_with, LoadOptions, LoadSummary,
};
pub use memory::{MemoryGraph, StoredEdge, StoredNode};
pub use plan::{Plan, Statement};
pub use session::GraphSession;
pub use sync_metadata::{merge_module_sync_metadata, module_sync_metadata_schema};
