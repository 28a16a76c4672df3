use std::sync::Arc;

use super::registry::ObjectRegistry;
use crate::config::{Config, ServerSettings};
use crate::database::Datasources;
use crate::error::ServerResult;

/// State shared by every link handler, the dispatcher and the reaper
pub struct AgentContext {
    pub registry: Arc<ObjectRegistry>,
    pub datasources: Arc<Datasources>,
    pub settings: ServerSettings,
}

impl AgentContext {
    pub fn new(datasources: Datasources, settings: ServerSettings) -> Self {
        Self {
            registry: Arc::new(ObjectRegistry::new()),
            datasources: Arc::new(datasources),
            settings,
        }
    }

    /// Open a physical pool for every configured catalog
    pub fn from_config(config: &Config) -> ServerResult<Self> {
        let datasources = Datasources::from_config(config)?;
        tracing::info!("Datasources ready: {:?}", datasources.catalogs());
        Ok(Self::new(datasources, config.server.clone()))
    }
}
