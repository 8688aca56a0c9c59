//! `status` command.

use anyhow::Result;

use super::Backend;
use crate::output;

pub async fn execute(backend: &Backend) -> Result<()> {
    let counts = match backend {
        Backend::Neo4j(client) => client.get_counts().await?,
        Backend::Memory(graph) => graph.counts().await,
    };
    output::print_counts(&counts);
    Ok(())
}
