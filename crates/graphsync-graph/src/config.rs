//! `graphsync.toml` loading.
//!
//! ```toml
//! [neo4j]
//! uri = "bolt://localhost:7687"
//! user = "neo4j"
//! password = "secret"
//! database = "neo4j"
//!
//! [load]
//! batch_size = 10000
//!
//! [cleanup]
//! iteration_size = 100
//! max_iterations = 100000
//! ```
//!
//! Every section and key is optional. `NEO4J_URI`, `NEO4J_USER`,
//! `NEO4J_PASSWORD` and `NEO4J_DATABASE` override the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::client::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::job::{GraphJob, DEFAULT_ITERATION_SIZE, DEFAULT_MAX_ITERATIONS};
use crate::load::LoadOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOptions {
    #[serde(default = "default_iteration_size")]
    pub iteration_size: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_iteration_size() -> usize {
    DEFAULT_ITERATION_SIZE
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            iteration_size: DEFAULT_ITERATION_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl CleanupOptions {
    /// Apply these limits to a job.
    pub fn apply(&self, job: GraphJob) -> GraphJob {
        job.with_iteration_size(self.iteration_size)
            .with_max_iterations(self.max_iterations)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub neo4j: GraphConfig,
    #[serde(default)]
    pub load: LoadOptions,
    #[serde(default)]
    pub cleanup: CleanupOptions,
}

impl SyncConfig {
    /// Read a config file and apply environment overrides.
    pub fn from_path(path: &Path) -> GraphResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&text, |name| std::env::var(name).ok())
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> GraphResult<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> GraphResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse, apply overrides, then validate the result.
    fn from_toml_with_env(
        text: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> GraphResult<Self> {
        let mut config: Self = toml::from_str(text)?;
        config.apply_env_with(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.neo4j.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.neo4j.database = database;
        }
    }

    fn validate(&self) -> GraphResult<()> {
        if self.load.batch_size == 0 {
            return Err(GraphError::Config("load.batch_size must be at least 1".to_string()));
        }
        if self.cleanup.iteration_size == 0 {
            return Err(GraphError::Config("cleanup.iteration_size must be at least 1".to_string()));
        }
        if self.cleanup.max_iterations == 0 {
            return Err(GraphError::Config("cleanup.max_iterations must be at least 1".to_string()));
        }
        if self.neo4j.uri.is_empty() {
            return Err(GraphError::Config("neo4j.uri must not be empty".to_string()));
        }
        Ok(())
    }
}
