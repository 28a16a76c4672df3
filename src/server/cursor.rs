use crate::database::{DbResultSet, DriverResult};
use crate::driver::{ColumnDescriptor, ResultBatch, Value};

/// Rows per batch when the client asks for 0
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Upper bound on a single batch, whatever the client asks for
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Server-side cursor over a live result set, streamed to the client in batches.
///
/// Metadata is read from the database once and cached. Rows are never kept
/// after they have been sent, apart from a single row of lookahead that lets
/// the batch which drains the cursor report `exhausted = true` itself.
pub struct Cursor {
    inner: Box<dyn DbResultSet>,
    metadata: Option<Vec<ColumnDescriptor>>,
    lookahead: Option<Vec<Value>>,
    exhausted: bool,
}

impl Cursor {
    pub fn new(inner: Box<dyn DbResultSet>) -> Self {
        Self {
            inner,
            metadata: None,
            lookahead: None,
            exhausted: false,
        }
    }

    pub fn metadata(&mut self) -> DriverResult<Vec<ColumnDescriptor>> {
        if let Some(meta) = &self.metadata {
            return Ok(meta.clone());
        }
        let meta = self.inner.metadata()?;
        self.metadata = Some(meta.clone());
        Ok(meta)
    }

    /// Advance the cursor by up to `max_rows` rows
    pub fn fetch_batch(&mut self, max_rows: usize) -> DriverResult<ResultBatch> {
        if self.exhausted {
            return Ok(ResultBatch {
                rows: Vec::new(),
                exhausted: true,
            });
        }

        let limit = match max_rows {
            0 => DEFAULT_BATCH_SIZE,
            n => n.min(MAX_BATCH_SIZE),
        };

        let mut rows = Vec::with_capacity(limit.min(1024));
        if let Some(row) = self.lookahead.take() {
            rows.push(row);
        }
        while rows.len() < limit {
            match self.inner.next_row()? {
                Some(row) => rows.push(row),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if !self.exhausted {
            match self.inner.next_row()? {
                Some(row) => self.lookahead = Some(row),
                None => self.exhausted = true,
            }
        }

        Ok(ResultBatch {
            rows,
            exhausted: self.exhausted,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn close(&mut self) -> DriverResult<()> {
        self.lookahead = None;
        self.exhausted = true;
        self.inner.close()
    }
}
