use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::result_set::RemoteResultSet;
use super::{expect_bool, expect_i64, expect_key, RemoteObject};
use crate::protocol::{ops, AgentError, ClassType, Value};

/// Accessors shared by plain and prepared statements
struct StatementCore {
    object: RemoteObject,
    fetch_size: AtomicUsize,
    closed: AtomicBool,
}

impl StatementCore {
    fn new(object: RemoteObject, fetch_size: usize) -> Self {
        Self {
            object,
            fetch_size: AtomicUsize::new(fetch_size),
            closed: AtomicBool::new(false),
        }
    }

    fn result_set_proxy(&self, value: Value, operation: &str) -> Result<RemoteResultSet, AgentError> {
        let key = expect_key(value, operation)?;
        Ok(RemoteResultSet::new(
            self.object.child(ClassType::ResultSet, key),
            self.fetch_size.load(Ordering::Relaxed),
        ))
    }

    async fn query(&self, arguments: Vec<Value>) -> Result<RemoteResultSet, AgentError> {
        let value = self.object.invoke(ops::EXECUTE_QUERY, arguments).await?;
        self.result_set_proxy(value, ops::EXECUTE_QUERY)
    }

    async fn update(&self, arguments: Vec<Value>) -> Result<i64, AgentError> {
        let value = self.object.invoke(ops::EXECUTE_UPDATE, arguments).await?;
        expect_i64(value, ops::EXECUTE_UPDATE)
    }

    async fn execute(&self, arguments: Vec<Value>) -> Result<bool, AgentError> {
        let value = self.object.invoke(ops::EXECUTE, arguments).await?;
        expect_bool(value, ops::EXECUTE)
    }

    async fn result_set(&self) -> Result<Option<RemoteResultSet>, AgentError> {
        match self.object.invoke(ops::GET_RESULT_SET, vec![]).await? {
            Value::Null => Ok(None),
            value => self.result_set_proxy(value, ops::GET_RESULT_SET).map(Some),
        }
    }

    async fn update_count(&self) -> Result<i64, AgentError> {
        let value = self.object.invoke(ops::GET_UPDATE_COUNT, vec![]).await?;
        expect_i64(value, ops::GET_UPDATE_COUNT)
    }

    async fn set_max_rows(&self, max_rows: i32) -> Result<(), AgentError> {
        self.object
            .invoke(ops::SET_MAX_ROWS, vec![Value::Int(max_rows)])
            .await?;
        Ok(())
    }

    async fn max_rows(&self) -> Result<i64, AgentError> {
        let value = self.object.invoke(ops::GET_MAX_ROWS, vec![]).await?;
        expect_i64(value, ops::GET_MAX_ROWS)
    }

    async fn set_fetch_size(&self, rows: i32) -> Result<(), AgentError> {
        self.object
            .invoke(ops::SET_FETCH_SIZE, vec![Value::Int(rows)])
            .await?;
        if rows > 0 {
            self.fetch_size.store(rows as usize, Ordering::Relaxed);
        }
        Ok(())
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.object.invoke(ops::CLOSE, vec![]).await?;
        Ok(())
    }
}

/// Remote statement executing ad hoc SQL text
pub struct RemoteStatement {
    core: StatementCore,
}

impl RemoteStatement {
    pub(crate) fn new(object: RemoteObject, fetch_size: usize) -> Self {
        Self {
            core: StatementCore::new(object, fetch_size),
        }
    }

    pub fn key(&self) -> crate::protocol::ObjectKey {
        self.core.object.key()
    }

    pub async fn execute_query(&self, sql: &str) -> Result<RemoteResultSet, AgentError> {
        self.core.query(vec![Value::from(sql)]).await
    }

    pub async fn execute_update(&self, sql: &str) -> Result<i64, AgentError> {
        self.core.update(vec![Value::from(sql)]).await
    }

    /// Returns `true` when the statement produced a result set
    pub async fn execute(&self, sql: &str) -> Result<bool, AgentError> {
        self.core.execute(vec![Value::from(sql)]).await
    }

    pub async fn result_set(&self) -> Result<Option<RemoteResultSet>, AgentError> {
        self.core.result_set().await
    }

    pub async fn update_count(&self) -> Result<i64, AgentError> {
        self.core.update_count().await
    }

    pub async fn set_max_rows(&self, max_rows: i32) -> Result<(), AgentError> {
        self.core.set_max_rows(max_rows).await
    }

    pub async fn max_rows(&self) -> Result<i64, AgentError> {
        self.core.max_rows().await
    }

    pub async fn set_fetch_size(&self, rows: i32) -> Result<(), AgentError> {
        self.core.set_fetch_size(rows).await
    }

    pub fn fetch_size(&self) -> usize {
        self.core.fetch_size()
    }

    pub async fn close(&self) -> Result<(), AgentError> {
        self.core.close().await
    }
}

impl std::fmt::Debug for RemoteStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStatement")
            .field("key", &self.key())
            .finish()
    }
}

/// Remote prepared statement; parameters are bound server-side, 1-based
pub struct RemotePreparedStatement {
    core: StatementCore,
}

impl std::fmt::Debug for RemotePreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePreparedStatement")
            .field("key", &self.key())
            .finish()
    }
}

impl RemotePreparedStatement {
    pub(crate) fn new(object: RemoteObject, fetch_size: usize) -> Self {
        Self {
            core: StatementCore::new(object, fetch_size),
        }
    }

    pub fn key(&self) -> crate::protocol::ObjectKey {
        self.core.object.key()
    }

    async fn bind(&self, operation: &str, index: usize, value: Value) -> Result<(), AgentError> {
        let index = i32::try_from(index).map_err(|_| AgentError::OperationFailure {
            message: format!("parameter index {} out of range", index),
            code: None,
        })?;
        let mut arguments = vec![Value::Int(index)];
        if operation != ops::SET_NULL {
            arguments.push(value);
        }
        self.core.object.invoke(operation, arguments).await?;
        Ok(())
    }

    pub async fn set_null(&self, index: usize) -> Result<(), AgentError> {
        self.bind(ops::SET_NULL, index, Value::Null).await
    }

    pub async fn set_bool(&self, index: usize, value: bool) -> Result<(), AgentError> {
        self.bind(ops::SET_BOOLEAN, index, Value::Bool(value)).await
    }

    pub async fn set_int(&self, index: usize, value: i32) -> Result<(), AgentError> {
        self.bind(ops::SET_INT, index, Value::Int(value)).await
    }

    pub async fn set_long(&self, index: usize, value: i64) -> Result<(), AgentError> {
        self.bind(ops::SET_LONG, index, Value::Long(value)).await
    }

    pub async fn set_double(&self, index: usize, value: f64) -> Result<(), AgentError> {
        self.bind(ops::SET_DOUBLE, index, Value::Double(value)).await
    }

    pub async fn set_string(&self, index: usize, value: &str) -> Result<(), AgentError> {
        self.bind(ops::SET_STRING, index, Value::from(value)).await
    }

    pub async fn set_bytes(&self, index: usize, value: &[u8]) -> Result<(), AgentError> {
        self.bind(ops::SET_BYTES, index, Value::Bytes(value.to_vec())).await
    }

    pub async fn set_timestamp(&self, index: usize, value: DateTime<Utc>) -> Result<(), AgentError> {
        self.bind(ops::SET_TIMESTAMP, index, Value::Timestamp(value)).await
    }

    /// Bind any wire value; `Value::Null` binds SQL NULL
    pub async fn set_value(&self, index: usize, value: impl Into<Value>) -> Result<(), AgentError> {
        self.bind(ops::SET_OBJECT, index, value.into()).await
    }

    pub async fn clear_parameters(&self) -> Result<(), AgentError> {
        self.core.object.invoke(ops::CLEAR_PARAMETERS, vec![]).await?;
        Ok(())
    }

    pub async fn execute_query(&self) -> Result<RemoteResultSet, AgentError> {
        self.core.query(vec![]).await
    }

    pub async fn execute_update(&self) -> Result<i64, AgentError> {
        self.core.update(vec![]).await
    }

    pub async fn execute(&self) -> Result<bool, AgentError> {
        self.core.execute(vec![]).await
    }

    pub async fn result_set(&self) -> Result<Option<RemoteResultSet>, AgentError> {
        self.core.result_set().await
    }

    pub async fn update_count(&self) -> Result<i64, AgentError> {
        self.core.update_count().await
    }

    pub async fn set_max_rows(&self, max_rows: i32) -> Result<(), AgentError> {
        self.core.set_max_rows(max_rows).await
    }

    pub async fn max_rows(&self) -> Result<i64, AgentError> {
        self.core.max_rows().await
    }

    pub async fn set_fetch_size(&self, rows: i32) -> Result<(), AgentError> {
        self.core.set_fetch_size(rows).await
    }

    pub fn fetch_size(&self) -> usize {
        self.core.fetch_size()
    }

    pub async fn close(&self) -> Result<(), AgentError> {
        self.core.close().await
    }
}
