//! Server-local database-client interface
//!
//! The dispatcher drives these traits; every remote handle a client holds is
//! backed by one of them. Calls are synchronous and run on blocking threads.

pub mod datasource;
pub mod sqlite;

use thiserror::Error;

use crate::driver::{ColumnDescriptor, Value};

pub use datasource::Datasources;

/// Error raised by the database itself. Message and vendor code travel to the
/// client unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub code: Option<i32>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn closed(what: &str) -> Self {
        Self::new(format!("{} is closed", what))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

pub trait DbConnection: Send {
    fn create_statement(&mut self) -> DriverResult<Box<dyn DbStatement>>;
    fn prepare_statement(&mut self, sql: &str) -> DriverResult<Box<dyn DbPreparedStatement>>;
    fn set_auto_commit(&mut self, auto_commit: bool) -> DriverResult<()>;
    fn auto_commit(&self) -> DriverResult<bool>;
    fn commit(&mut self) -> DriverResult<()>;
    fn rollback(&mut self) -> DriverResult<()>;
    fn is_valid(&mut self) -> bool;
    fn is_closed(&self) -> bool;
    fn catalog(&self) -> DriverResult<String>;
    /// Roll back open work and hand the physical connection back to its pool
    fn close(&mut self) -> DriverResult<()>;
}

/// Accessors common to plain and prepared statements
pub trait StatementOptions: Send {
    /// 0 means unlimited
    fn set_max_rows(&mut self, max_rows: usize) -> DriverResult<()>;
    fn max_rows(&self) -> usize;
    /// Rows read from the database per round trip; 0 restores the default
    fn set_fetch_size(&mut self, rows: usize) -> DriverResult<()>;
    fn fetch_size(&self) -> usize;
    /// Rows changed by the last execution, -1 if it produced a result set
    fn update_count(&self) -> i64;
    /// Result set produced by the last `execute`, at most once
    fn take_result_set(&mut self) -> DriverResult<Option<Box<dyn DbResultSet>>>;
    fn close(&mut self) -> DriverResult<()>;
}

pub trait DbStatement: StatementOptions {
    fn execute_query(&mut self, sql: &str) -> DriverResult<Box<dyn DbResultSet>>;
    fn execute_update(&mut self, sql: &str) -> DriverResult<i64>;
    /// `true` when the statement produced a result set
    fn execute(&mut self, sql: &str) -> DriverResult<bool>;
}

pub trait DbPreparedStatement: StatementOptions {
    /// Bind a 1-based parameter
    fn set_parameter(&mut self, index: usize, value: Value) -> DriverResult<()>;
    fn clear_parameters(&mut self);
    fn execute_query(&mut self) -> DriverResult<Box<dyn DbResultSet>>;
    fn execute_update(&mut self) -> DriverResult<i64>;
    fn execute(&mut self) -> DriverResult<bool>;
}

pub trait DbResultSet: Send {
    fn metadata(&mut self) -> DriverResult<Vec<ColumnDescriptor>>;
    fn next_row(&mut self) -> DriverResult<Option<Vec<Value>>>;
    fn close(&mut self) -> DriverResult<()>;
}
