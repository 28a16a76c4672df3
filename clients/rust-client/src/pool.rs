//! Connection-pool adapter
//!
//! Pooled handles wrap a [`RemoteConnection`]. Closing (or dropping) a pooled
//! handle releases the remote session on the server right away instead of
//! waiting for the reaper, then detaches the object from the pool.

use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult};
use deadpool::Runtime;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{AgentDriver, ConnectProperties, RemoteConnection};
use crate::protocol::AgentError;

/// Access to the remote session behind a pool wrapper
pub trait RemoteSession {
    fn remote_session(&self) -> Option<&RemoteConnection>;
}

impl RemoteSession for RemoteConnection {
    fn remote_session(&self) -> Option<&RemoteConnection> {
        Some(self)
    }
}

impl RemoteSession for Object<RemoteConnectionManager> {
    fn remote_session(&self) -> Option<&RemoteConnection> {
        Some(self.deref())
    }
}

/// deadpool manager opening remote sessions through an [`AgentDriver`]
pub struct RemoteConnectionManager {
    driver: Arc<AgentDriver>,
    url: String,
    props: ConnectProperties,
}

impl RemoteConnectionManager {
    pub fn new(driver: Arc<AgentDriver>, url: &str, props: ConnectProperties) -> Self {
        Self {
            driver,
            url: url.to_string(),
            props,
        }
    }
}

impl managed::Manager for RemoteConnectionManager {
    type Type = RemoteConnection;
    type Error = AgentError;

    async fn create(&self) -> Result<RemoteConnection, AgentError> {
        self.driver.connect(&self.url, &self.props).await
    }

    async fn recycle(
        &self,
        conn: &mut RemoteConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<AgentError> {
        if conn.is_closed() {
            return Err(RecycleError::Backend(AgentError::ConnectionError(format!(
                "session {} already closed",
                conn.key()
            ))));
        }
        match conn.is_valid().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RecycleError::Backend(AgentError::StaleReference(format!(
                "session {} is no longer valid",
                conn.key()
            )))),
            Err(e) => Err(RecycleError::Backend(e)),
        }
    }
}

/// Pool of remote sessions on one catalog
#[derive(Clone)]
pub struct AgentPool {
    inner: managed::Pool<RemoteConnectionManager>,
}

pub struct AgentPoolBuilder {
    manager: RemoteConnectionManager,
    max_size: usize,
    wait_timeout: Option<Duration>,
}

impl AgentPoolBuilder {
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size.max(1);
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<AgentPool, AgentError> {
        let inner = managed::Pool::builder(self.manager)
            .max_size(self.max_size)
            .wait_timeout(self.wait_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| AgentError::ConnectionError(format!("Failed to build pool: {}", e)))?;
        Ok(AgentPool { inner })
    }
}

impl AgentPool {
    pub fn builder(driver: Arc<AgentDriver>, url: &str, props: ConnectProperties) -> AgentPoolBuilder {
        AgentPoolBuilder {
            manager: RemoteConnectionManager::new(driver, url, props),
            max_size: 8,
            wait_timeout: None,
        }
    }

    pub async fn get(&self) -> Result<PooledConnection, AgentError> {
        let object = self.inner.get().await.map_err(|e| match e {
            PoolError::Backend(e) => e,
            other => AgentError::ConnectionError(other.to_string()),
        })?;
        Ok(PooledConnection {
            object: Some(object),
        })
    }

    /// Sessions currently owned by the pool, idle or checked out
    pub fn size(&self) -> usize {
        self.inner.status().size
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

/// Pooled handle; dereferences to the wrapped [`RemoteConnection`]
pub struct PooledConnection {
    object: Option<Object<RemoteConnectionManager>>,
}

impl Deref for PooledConnection {
    type Target = RemoteConnection;

    fn deref(&self) -> &RemoteConnection {
        // `object` is only taken by `close` (which consumes self) and `drop`
        self.object
            .as_ref()
            .map(|o| o.deref())
            .unwrap_or_else(|| unreachable!("pooled connection used after close"))
    }
}

impl PooledConnection {
    /// Release the remote session, then detach it from the pool. Release
    /// failures are logged and never surface to the caller.
    pub async fn close(mut self) {
        if let Some(object) = self.object.take() {
            release_and_detach(object).await;
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_and_detach(object));
            }
            Err(_) => {
                tracing::warn!(
                    "Pooled session {} dropped outside a runtime; leaving it to the server reaper",
                    object.key()
                );
                let _ = Object::take(object);
            }
        }
    }
}

async fn release_and_detach(object: Object<RemoteConnectionManager>) {
    match object.remote_session() {
        Some(session) => match session.release().await {
            Ok(true) => tracing::debug!("Released pooled session {}", session.key()),
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to release pooled session {}: {}", session.key(), e),
        },
        None => tracing::debug!("Pooled handle does not wrap a remote session"),
    }
    let _ = Object::take(object);
}
