use std::collections::VecDeque;
use std::sync::Arc;

use super::RemoteObject;
use crate::protocol::{ops, AgentError, ColumnDescriptor, ObjectKey, ResultBatch, Value};

/// One row of a remote result set, aligned with the result set's metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Remote cursor. Rows arrive one batch at a time; only the current batch is
/// held locally.
pub struct RemoteResultSet {
    object: RemoteObject,
    fetch_size: usize,
    metadata: Option<Arc<Vec<ColumnDescriptor>>>,
    buffer: VecDeque<Vec<Value>>,
    exhausted: bool,
    closed: bool,
}

impl RemoteResultSet {
    pub(crate) fn new(object: RemoteObject, fetch_size: usize) -> Self {
        Self {
            object,
            fetch_size: fetch_size.max(1),
            metadata: None,
            buffer: VecDeque::new(),
            exhausted: false,
            closed: false,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.object.key()
    }

    /// Column descriptors; fetched from the server on first use only
    pub async fn metadata(&mut self) -> Result<Arc<Vec<ColumnDescriptor>>, AgentError> {
        if let Some(meta) = &self.metadata {
            return Ok(meta.clone());
        }
        let meta = match self.object.invoke(ops::FETCH_METADATA, vec![]).await? {
            Value::Metadata(columns) => Arc::new(columns),
            other => {
                return Err(AgentError::MalformedMessage(format!(
                    "{} returned {}, expected metadata",
                    ops::FETCH_METADATA,
                    other.type_name()
                )))
            }
        };
        self.metadata = Some(meta.clone());
        Ok(meta)
    }

    /// Zero-based position of the column called `name` (case-insensitive)
    pub async fn column_index(&mut self, name: &str) -> Result<Option<usize>, AgentError> {
        let meta = self.metadata().await?;
        Ok(meta.iter().position(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Pull up to `max_rows` rows straight from the server cursor
    pub async fn fetch_batch(&self, max_rows: usize) -> Result<ResultBatch, AgentError> {
        let max_rows = i32::try_from(max_rows).unwrap_or(i32::MAX);
        match self
            .object
            .invoke(ops::FETCH_BATCH, vec![Value::Int(max_rows)])
            .await?
        {
            Value::Batch(batch) => Ok(batch),
            other => Err(AgentError::MalformedMessage(format!(
                "{} returned {}, expected batch",
                ops::FETCH_BATCH,
                other.type_name()
            ))),
        }
    }

    /// Next row, fetching another batch when the local one runs out
    pub async fn next(&mut self) -> Result<Option<Row>, AgentError> {
        if self.buffer.is_empty() && !self.exhausted {
            let batch = self.fetch_batch(self.fetch_size).await?;
            self.exhausted = batch.exhausted;
            self.buffer.extend(batch.rows);
        }
        Ok(self.buffer.pop_front().map(|values| Row { values }))
    }

    /// Drain the remaining rows into memory
    pub async fn collect_rows(&mut self) -> Result<Vec<Row>, AgentError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }

    pub async fn close(&mut self) -> Result<(), AgentError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();
        self.object.invoke(ops::CLOSE, vec![]).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RemoteResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteResultSet")
            .field("key", &self.key())
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .field("closed", &self.closed)
            .finish()
    }
}
