//! The execution interface the engine drives.

use async_trait::async_trait;

use crate::error::GraphResult;
use crate::plan::Statement;

/// A connection to a transactional graph store.
///
/// Implemented by [`crate::GraphClient`] for Neo4j and by
/// [`crate::MemoryGraph`]. A statement that matches nothing is a successful
/// zero-row result, never an error.
#[async_trait]
pub trait GraphSession: Send + Sync {
    /// Run one statement in its own transaction, returning the affected count.
    async fn run(&self, statement: &Statement) -> GraphResult<u64>;

    /// Run statements in order inside one transaction.
    ///
    /// Either every statement commits or none does. Returns one affected
    /// count per statement.
    async fn run_all(&self, statements: &[Statement]) -> GraphResult<Vec<u64>>;
}
