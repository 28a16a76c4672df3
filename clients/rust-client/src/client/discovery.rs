//! Directory lookup of a catalog's server address

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::protocol::AgentError;

/// Resolves a logical catalog name to the `host:port` of the server hosting it
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn resolve(&self, catalog: &str, servers: &[String]) -> Result<String, AgentError>;
}

/// Fixed catalog → address table, for deployments without a directory service
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, catalog: &str, address: &str) -> Self {
        self.entries.insert(catalog.to_string(), address.to_string());
        self
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn resolve(&self, catalog: &str, _servers: &[String]) -> Result<String, AgentError> {
        self.entries
            .get(catalog)
            .cloned()
            .ok_or_else(|| AgentError::DirectoryLookup(format!("no address for catalog '{}'", catalog)))
    }
}

/// Run a lookup bounded by `timeout`
pub(crate) async fn resolve_with_timeout(
    lookup: &dyn DirectoryLookup,
    catalog: &str,
    servers: &[String],
    timeout: Duration,
) -> Result<String, AgentError> {
    match tokio::time::timeout(timeout, lookup.resolve(catalog, servers)).await {
        Ok(Ok(address)) if !address.trim().is_empty() => Ok(address),
        Ok(Ok(_)) => Err(AgentError::DirectoryLookup(format!(
            "empty address for catalog '{}'",
            catalog
        ))),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(AgentError::DirectoryLookup(format!(
            "lookup of '{}' timed out after {:?}",
            catalog, timeout
        ))),
    }
}
