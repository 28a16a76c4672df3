//! Per-catalog physical connection pools

use r2d2::Pool;
use std::collections::HashMap;
use std::time::Duration;

use super::sqlite::{SqliteConnection, SqliteManager};
use super::DbConnection;
use crate::config::{CatalogConfig, Config};
use crate::error::{ServerError, ServerResult};

struct Datasource {
    config: CatalogConfig,
    pool: Pool<SqliteManager>,
}

/// The pools the server opens sessions on, keyed by catalog name
pub struct Datasources {
    sources: HashMap<String, Datasource>,
}

impl Datasources {
    pub fn from_config(config: &Config) -> ServerResult<Self> {
        let mut sources = HashMap::new();
        for (name, catalog) in &config.catalogs {
            let pool = build_pool(catalog).map_err(|e| {
                ServerError::Config(format!("Catalog '{}': failed to create pool: {}", name, e))
            })?;
            tracing::info!(
                "Catalog '{}' ready: driver={}, url={}, max={}",
                name,
                catalog.driver,
                catalog.url,
                catalog.max_size
            );
            sources.insert(
                name.clone(),
                Datasource {
                    config: catalog.clone(),
                    pool,
                },
            );
        }
        Ok(Self { sources })
    }

    pub fn catalogs(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check credentials and take a physical connection from the catalog's
    /// pool. Blocks for up to the configured connection timeout.
    pub fn checkout(
        &self,
        catalog: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> ServerResult<Box<dyn DbConnection>> {
        let source = self
            .sources
            .get(catalog)
            .ok_or_else(|| ServerError::Bootstrap(format!("Unknown catalog '{}'", catalog)))?;

        if let Some(expected) = source.config.user.as_deref() {
            let password_ok = source.config.password.as_deref().unwrap_or("") == password.unwrap_or("");
            if user != Some(expected) || !password_ok {
                tracing::warn!("Rejected credentials for catalog '{}'", catalog);
                return Err(ServerError::Bootstrap(format!(
                    "Access denied for catalog '{}'",
                    catalog
                )));
            }
        }

        let conn = source.pool.get().map_err(|e| {
            ServerError::Bootstrap(format!(
                "No database connection available for '{}': {}",
                catalog, e
            ))
        })?;
        let conn = SqliteConnection::new(conn, catalog)
            .map_err(|e| ServerError::Bootstrap(e.message))?;
        Ok(Box::new(conn))
    }

    /// (connections, idle) for `catalog`
    pub fn pool_state(&self, catalog: &str) -> Option<(u32, u32)> {
        self.sources.get(catalog).map(|s| {
            let state = s.pool.state();
            (state.connections, state.idle_connections)
        })
    }
}

fn build_pool(catalog: &CatalogConfig) -> Result<Pool<SqliteManager>, r2d2::Error> {
    let manager = SqliteManager::new(catalog.url.clone())
        .with_validation_query(catalog.validation_query.clone());

    Pool::builder()
        .max_size(catalog.max_size)
        .min_idle(catalog.min_idle)
        .connection_timeout(Duration::from_millis(catalog.connection_timeout_ms.max(1)))
        .idle_timeout(catalog.idle_eviction_ms.map(Duration::from_millis))
        .max_lifetime(catalog.max_lifetime_ms.map(Duration::from_millis))
        .test_on_check_out(true)
        .build(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn datasources(catalog: CatalogConfig) -> Datasources {
        let mut config = Config::default();
        config.catalogs.insert("mytest".into(), catalog);
        Datasources::from_config(&config).unwrap()
    }

    fn sqlite_catalog(dir: &TempDir) -> CatalogConfig {
        CatalogConfig::sqlite(dir.path().join("mytest.db").to_string_lossy())
    }

    #[test]
    fn test_checkout_without_credentials() {
        let dir = TempDir::new().unwrap();
        let sources = datasources(sqlite_catalog(&dir));
        assert_eq!(sources.catalogs(), vec!["mytest".to_string()]);

        let mut conn = sources.checkout("mytest", None, None).unwrap();
        assert!(conn.is_valid());
        assert_eq!(conn.catalog().unwrap(), "mytest");
        conn.close().unwrap();
    }

    #[test]
    fn test_unknown_catalog_is_bootstrap_failure() {
        let dir = TempDir::new().unwrap();
        let sources = datasources(sqlite_catalog(&dir));
        let err = sources.checkout("nope", None, None).err().unwrap();
        assert!(matches!(err, ServerError::Bootstrap(_)));
    }

    #[test]
    fn test_credentials_checked() {
        let dir = TempDir::new().unwrap();
        let sources = datasources(sqlite_catalog(&dir).with_credentials("root", "secret"));

        assert!(sources.checkout("mytest", Some("root"), Some("secret")).is_ok());
        assert!(sources.checkout("mytest", Some("root"), Some("wrong")).is_err());
        assert!(sources.checkout("mytest", None, None).is_err());
    }

    #[test]
    fn test_pool_exhaustion_fails_bootstrap() {
        let dir = TempDir::new().unwrap();
        let mut catalog = sqlite_catalog(&dir);
        catalog.max_size = 1;
        catalog.connection_timeout_ms = 50;
        let sources = datasources(catalog);

        let mut held = sources.checkout("mytest", None, None).unwrap();
        let err = sources.checkout("mytest", None, None).err().unwrap();
        assert!(err.to_string().contains("No database connection available"));

        held.close().unwrap();
        assert!(sources.checkout("mytest", None, None).is_ok());
    }

    #[test]
    fn test_failing_validation_query_rejects_checkout() {
        let dir = TempDir::new().unwrap();
        let mut catalog = sqlite_catalog(&dir);
        catalog.validation_query = Some("SELECT * FROM no_such_table".into());
        catalog.connection_timeout_ms = 100;
        catalog.min_idle = Some(0);
        let sources = datasources(catalog);
        assert!(sources.checkout("mytest", None, None).is_err());
    }
}
