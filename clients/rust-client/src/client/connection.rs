use std::sync::atomic::{AtomicBool, Ordering};

use super::statement::{RemotePreparedStatement, RemoteStatement};
use super::{expect_bool, expect_key, expect_string, RemoteObject};
use crate::protocol::{ops, AgentError, ClassType, ObjectKey, Value};

/// Remote session: a server-side database connection addressed by its root key
pub struct RemoteConnection {
    object: RemoteObject,
    catalog: String,
    fetch_size: usize,
    closed: AtomicBool,
    released: AtomicBool,
}

impl RemoteConnection {
    pub(crate) fn new(object: RemoteObject, catalog: String, fetch_size: usize) -> Self {
        Self {
            object,
            catalog,
            fetch_size,
            closed: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// Root key of this session in the server's registry
    pub fn key(&self) -> ObjectKey {
        self.object.key()
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub async fn create_statement(&self) -> Result<RemoteStatement, AgentError> {
        let value = self.object.invoke(ops::CREATE_STATEMENT, vec![]).await?;
        let key = expect_key(value, ops::CREATE_STATEMENT)?;
        Ok(RemoteStatement::new(
            self.object.child(ClassType::Statement, key),
            self.fetch_size,
        ))
    }

    pub async fn prepare_statement(&self, sql: &str) -> Result<RemotePreparedStatement, AgentError> {
        let value = self
            .object
            .invoke(ops::PREPARE_STATEMENT, vec![Value::from(sql)])
            .await?;
        let key = expect_key(value, ops::PREPARE_STATEMENT)?;
        Ok(RemotePreparedStatement::new(
            self.object.child(ClassType::PreparedStatement, key),
            self.fetch_size,
        ))
    }

    pub async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), AgentError> {
        self.object
            .invoke(ops::SET_AUTO_COMMIT, vec![Value::Bool(auto_commit)])
            .await?;
        Ok(())
    }

    pub async fn auto_commit(&self) -> Result<bool, AgentError> {
        let value = self.object.invoke(ops::GET_AUTO_COMMIT, vec![]).await?;
        expect_bool(value, ops::GET_AUTO_COMMIT)
    }

    pub async fn commit(&self) -> Result<(), AgentError> {
        self.object.invoke(ops::COMMIT, vec![]).await?;
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), AgentError> {
        self.object.invoke(ops::ROLLBACK, vec![]).await?;
        Ok(())
    }

    /// Server-side catalog name reported by the physical connection
    pub async fn remote_catalog(&self) -> Result<String, AgentError> {
        let value = self.object.invoke(ops::GET_CATALOG, vec![]).await?;
        expect_string(value, ops::GET_CATALOG)
    }

    /// Whether the session is still usable. A session the server no longer
    /// knows about is reported as invalid rather than as an error.
    pub async fn is_valid(&self) -> Result<bool, AgentError> {
        if self.is_closed() {
            return Ok(false);
        }
        match self.object.invoke(ops::IS_VALID, vec![]).await {
            Ok(value) => expect_bool(value, ops::IS_VALID),
            Err(e) if e.is_stale_reference() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Close the session and everything opened under it
    pub async fn close(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.object.invoke(ops::CLOSE, vec![]).await?;
        Ok(())
    }

    /// Ask the server to free the session right away. Used by the pool adapter
    /// when a pooled handle is closed. Returns `false` if the session was
    /// already closed or released, in which case nothing is sent.
    pub async fn release(&self) -> Result<bool, AgentError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.released.store(true, Ordering::Release);
        self.object.invoke(ops::RELEASE, vec![]).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("key", &self.key())
            .field("catalog", &self.catalog)
            .field("closed", &self.is_closed())
            .finish()
    }
}
