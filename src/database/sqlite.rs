//! SQLite implementation of the database-client traits
//!
//! Every physical connection lives on its own worker thread together with
//! the live cursors opened on it. The connection, its statements and result
//! sets hold a [`Worker`] handle and run each call there. A result set reads
//! from one SQLite cursor for its whole life, so consecutive batches come from
//! the same read snapshot. Closing the connection drops its cursors and hands
//! the pooled handle back to r2d2; later calls fail with "connection is closed".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ouroboros::self_referencing;
use r2d2::PooledConnection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, Rows, Statement};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use super::{
    DbConnection, DbPreparedStatement, DbResultSet, DbStatement, DriverError, DriverResult,
    StatementOptions,
};
use crate::driver::{ColumnDescriptor, Nullability, SqlType, Value};

pub const DEFAULT_FETCH_SIZE: usize = 100;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.unwrap_or_else(|| failure.to_string());
                DriverError::new(message).with_code(failure.extended_code)
            }
            other => DriverError::new(other.to_string()),
        }
    }
}

/// r2d2 manager for SQLite connections
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: String,
    validation_query: Option<String>,
}

impl SqliteManager {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            validation_query: None,
        }
    }

    pub fn with_validation_query(mut self, query: Option<String>) -> Self {
        self.validation_query = query;
        self
    }
}

impl r2d2::ManageConnection for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        tracing::trace!("Opening SQLite connection to {}", self.path);
        if self.path == ":memory:" {
            let conn = Connection::open_in_memory()?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            return Ok(conn);
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // open cursors keep their snapshot while other sessions write
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        match &self.validation_query {
            Some(query) => conn.query_row(query, [], |_| Ok(())),
            None => conn.execute_batch(""),
        }
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

type Pooled = PooledConnection<SqliteManager>;

/// A stepped statement kept open between batches
#[self_referencing]
struct LiveCursor {
    conn: Rc<Pooled>,
    #[borrows(conn)]
    #[not_covariant]
    stmt: Statement<'this>,
    #[borrows(mut stmt)]
    #[not_covariant]
    rows: Rows<'this>,
}

/// State owned by a connection's worker thread
struct Session {
    conn: Option<Rc<Pooled>>,
    cursors: HashMap<u64, LiveCursor>,
    next_cursor: u64,
}

impl Session {
    fn conn(&self) -> DriverResult<&Connection> {
        self.conn
            .as_deref()
            .map(|pooled| &**pooled)
            .ok_or_else(|| DriverError::closed("connection"))
    }

    fn open_cursor(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<(u64, Vec<ColumnDescriptor>)> {
        let conn = self
            .conn
            .clone()
            .ok_or_else(|| DriverError::closed("connection"))?;
        let mut columns = Vec::new();
        let cursor = LiveCursorTryBuilder {
            conn,
            stmt_builder: |conn| conn.prepare(sql),
            rows_builder: |stmt| {
                columns = describe_columns(stmt);
                stmt.query(rusqlite::params_from_iter(params.iter()))
            },
        }
        .try_build()?;

        let id = self.next_cursor;
        self.next_cursor += 1;
        self.cursors.insert(id, cursor);
        Ok((id, columns))
    }

    /// Up to `limit` rows from cursor `id`, and whether the cursor is drained.
    /// A drained cursor is dropped at once.
    fn read_cursor(
        &mut self,
        id: u64,
        limit: usize,
        columns: &[ColumnDescriptor],
    ) -> DriverResult<(Vec<Vec<Value>>, bool)> {
        self.conn()?;
        let cursor = self
            .cursors
            .get_mut(&id)
            .ok_or_else(|| DriverError::closed("result set"))?;

        let mut rows = Vec::with_capacity(limit.min(DEFAULT_FETCH_SIZE));
        let drained = cursor.with_rows_mut(|cursor_rows| -> DriverResult<bool> {
            while rows.len() < limit {
                match cursor_rows.next()? {
                    Some(row) => rows.push(decode_row(row, columns)?),
                    None => return Ok(true),
                }
            }
            Ok(false)
        })?;

        if drained {
            self.cursors.remove(&id);
        }
        Ok((rows, drained))
    }

    fn close(&mut self) -> DriverResult<()> {
        self.cursors.clear();
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        // dropping the last share returns the handle to r2d2
        Ok(())
    }
}

type Job = Box<dyn FnOnce(&mut Session) + Send>;

/// Handle to the thread that owns one physical connection
#[derive(Clone)]
struct Worker {
    jobs: mpsc::Sender<Job>,
}

impl Worker {
    fn spawn(conn: Pooled, name: String) -> DriverResult<Self> {
        let (jobs, rx) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let mut session = Session {
                    conn: Some(Rc::new(conn)),
                    cursors: HashMap::new(),
                    next_cursor: 1,
                };
                while let Ok(job) = rx.recv() {
                    job(&mut session);
                }
                if let Err(e) = session.close() {
                    tracing::warn!("Rollback on worker exit failed: {}", e);
                }
            })
            .map_err(|e| DriverError::new(format!("Cannot start connection worker: {}", e)))?;
        Ok(Self { jobs })
    }

    /// Run `f` on the worker and wait for its result
    fn call<T, F>(&self, f: F) -> DriverResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> DriverResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.jobs
            .send(Box::new(move |session| {
                let _ = tx.send(f(session));
            }))
            .map_err(|_| DriverError::closed("connection"))?;
        rx.recv().map_err(|_| DriverError::closed("connection"))?
    }

    /// Queue `f` without waiting
    fn post(&self, f: impl FnOnce(&mut Session) + Send + 'static) {
        let _ = self.jobs.send(Box::new(f));
    }
}

pub struct SqliteConnection {
    worker: Worker,
    catalog: String,
    auto_commit: bool,
}

impl SqliteConnection {
    pub fn new(conn: Pooled, catalog: impl Into<String>) -> DriverResult<Self> {
        let catalog = catalog.into();
        let worker = Worker::spawn(conn, format!("sqlite-{}", catalog))?;
        Ok(Self {
            worker,
            catalog,
            auto_commit: true,
        })
    }

    fn ensure_open(&self) -> DriverResult<()> {
        self.worker.call(|session| session.conn().map(|_| ()))
    }

    /// End the open transaction with `verb` (COMMIT or ROLLBACK) and start the next one
    fn finish_transaction(&mut self, verb: &'static str) -> DriverResult<()> {
        if self.auto_commit {
            return Err(DriverError::new(format!(
                "Cannot {} while auto-commit is enabled",
                verb.to_ascii_lowercase()
            )));
        }
        self.worker.call(move |session| {
            let conn = session.conn()?;
            if !conn.is_autocommit() {
                conn.execute_batch(verb)?;
            }
            conn.execute_batch("BEGIN")?;
            Ok(())
        })
    }
}

impl DbConnection for SqliteConnection {
    fn create_statement(&mut self) -> DriverResult<Box<dyn DbStatement>> {
        self.ensure_open()?;
        Ok(Box::new(SqliteStatement {
            state: StatementState::new(self.worker.clone()),
        }))
    }

    fn prepare_statement(&mut self, sql: &str) -> DriverResult<Box<dyn DbPreparedStatement>> {
        let owned = sql.to_string();
        let parameter_count = self
            .worker
            .call(move |session| Ok(session.conn()?.prepare(&owned)?.parameter_count()))?;
        Ok(Box::new(SqlitePreparedStatement {
            state: StatementState::new(self.worker.clone()),
            sql: sql.to_string(),
            parameters: vec![None; parameter_count],
        }))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> DriverResult<()> {
        if auto_commit == self.auto_commit {
            return self.ensure_open();
        }
        self.worker.call(move |session| {
            let conn = session.conn()?;
            if auto_commit {
                if !conn.is_autocommit() {
                    conn.execute_batch("COMMIT")?;
                }
            } else {
                conn.execute_batch("BEGIN")?;
            }
            Ok(())
        })?;
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> DriverResult<bool> {
        self.ensure_open()?;
        Ok(self.auto_commit)
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.finish_transaction("COMMIT")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.finish_transaction("ROLLBACK")
    }

    fn is_valid(&mut self) -> bool {
        self.worker
            .call(|session| {
                session.conn()?.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .is_ok()
    }

    fn is_closed(&self) -> bool {
        self.worker
            .call(|session| Ok(session.conn.is_none()))
            .unwrap_or(true)
    }

    fn catalog(&self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self.catalog.clone())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.worker.call(Session::close)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Err(e) = DbConnection::close(self) {
            tracing::warn!("Rollback on drop failed for catalog '{}': {}", self.catalog, e);
        }
    }
}

/// What the worker produced for one execution
enum Opened {
    Count(i64),
    Cursor(u64, Vec<ColumnDescriptor>),
    Rows(Vec<ColumnDescriptor>, VecDeque<Vec<Value>>),
}

/// Outcome of running one statement
enum Execution {
    Rows(Box<dyn DbResultSet>),
    Count(i64),
}

struct StatementState {
    worker: Worker,
    max_rows: usize,
    fetch_size: usize,
    update_count: i64,
    pending: Option<Box<dyn DbResultSet>>,
    closed: bool,
}

impl StatementState {
    fn new(worker: Worker) -> Self {
        Self {
            worker,
            max_rows: 0,
            fetch_size: DEFAULT_FETCH_SIZE,
            update_count: -1,
            pending: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::closed("statement"));
        }
        Ok(())
    }

    fn run(&mut self, sql: &str, params: Vec<SqlValue>) -> DriverResult<Execution> {
        self.ensure_open()?;
        self.update_count = -1;
        if let Some(mut previous) = self.pending.take() {
            if let Err(e) = previous.close() {
                tracing::warn!("Failed to close replaced result set: {}", e);
            }
        }

        let sql = sql.to_string();
        let max_rows = self.max_rows;
        let opened = self.worker.call(move |session| {
            let mut stmt = session.conn()?.prepare(&sql)?;
            if stmt.column_count() == 0 {
                let changed = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
                return Ok(Opened::Count(changed as i64));
            }
            if stmt.readonly() {
                drop(stmt);
                let (id, columns) = session.open_cursor(&sql, &params)?;
                return Ok(Opened::Cursor(id, columns));
            }

            // writes with RETURNING complete before the call returns
            let columns = describe_columns(&stmt);
            let mut rows = VecDeque::new();
            let mut cursor = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            while let Some(row) = cursor.next()? {
                if max_rows > 0 && rows.len() >= max_rows {
                    continue;
                }
                rows.push_back(decode_row(row, &columns)?);
            }
            Ok(Opened::Rows(columns, rows))
        })?;

        Ok(match opened {
            Opened::Count(count) => {
                self.update_count = count;
                Execution::Count(count)
            }
            Opened::Cursor(id, columns) => Execution::Rows(Box::new(SqliteResultSet {
                worker: self.worker.clone(),
                cursor: id,
                columns: Arc::new(columns),
                fetch_size: self.fetch_size,
                max_rows: self.max_rows,
                delivered: 0,
                buffer: VecDeque::new(),
                drained: false,
                closed: false,
            })),
            Opened::Rows(columns, rows) => Execution::Rows(Box::new(EagerResultSet {
                columns,
                rows,
                closed: false,
            })),
        })
    }

    fn query(&mut self, sql: &str, params: Vec<SqlValue>) -> DriverResult<Box<dyn DbResultSet>> {
        match self.run_checked(sql, params, true)? {
            Execution::Rows(rs) => Ok(rs),
            Execution::Count(_) => Err(DriverError::new("Statement did not return a result set")),
        }
    }

    fn update(&mut self, sql: &str, params: Vec<SqlValue>) -> DriverResult<i64> {
        match self.run_checked(sql, params, false)? {
            Execution::Count(count) => Ok(count),
            Execution::Rows(_) => Err(DriverError::new("Statement returned a result set")),
        }
    }

    fn execute(&mut self, sql: &str, params: Vec<SqlValue>) -> DriverResult<bool> {
        match self.run(sql, params)? {
            Execution::Rows(rs) => {
                self.pending = Some(rs);
                Ok(true)
            }
            Execution::Count(_) => Ok(false),
        }
    }

    /// Reject the wrong statement kind before anything runs
    fn run_checked(
        &mut self,
        sql: &str,
        params: Vec<SqlValue>,
        want_rows: bool,
    ) -> DriverResult<Execution> {
        let owned = sql.to_string();
        let returns_rows = self
            .worker
            .call(move |session| Ok(session.conn()?.prepare(&owned)?.column_count() > 0))?;
        if returns_rows != want_rows {
            return Err(DriverError::new(if want_rows {
                "Statement did not return a result set"
            } else {
                "Statement returned a result set"
            }));
        }
        self.run(sql, params)
    }

    fn set_max_rows(&mut self, max_rows: usize) -> DriverResult<()> {
        self.ensure_open()?;
        self.max_rows = max_rows;
        Ok(())
    }

    fn set_fetch_size(&mut self, rows: usize) -> DriverResult<()> {
        self.ensure_open()?;
        self.fetch_size = if rows == 0 { DEFAULT_FETCH_SIZE } else { rows };
        Ok(())
    }

    fn take_result_set(&mut self) -> DriverResult<Option<Box<dyn DbResultSet>>> {
        self.ensure_open()?;
        Ok(self.pending.take())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        if let Some(mut rs) = self.pending.take() {
            rs.close()?;
        }
        Ok(())
    }
}

macro_rules! impl_statement_options {
    ($ty:ty) => {
        impl StatementOptions for $ty {
            fn set_max_rows(&mut self, max_rows: usize) -> DriverResult<()> {
                self.state.set_max_rows(max_rows)
            }

            fn max_rows(&self) -> usize {
                self.state.max_rows
            }

            fn set_fetch_size(&mut self, rows: usize) -> DriverResult<()> {
                self.state.set_fetch_size(rows)
            }

            fn fetch_size(&self) -> usize {
                self.state.fetch_size
            }

            fn update_count(&self) -> i64 {
                self.state.update_count
            }

            fn take_result_set(&mut self) -> DriverResult<Option<Box<dyn DbResultSet>>> {
                self.state.take_result_set()
            }

            fn close(&mut self) -> DriverResult<()> {
                self.state.close()
            }
        }
    };
}

pub struct SqliteStatement {
    state: StatementState,
}

impl_statement_options!(SqliteStatement);

impl DbStatement for SqliteStatement {
    fn execute_query(&mut self, sql: &str) -> DriverResult<Box<dyn DbResultSet>> {
        self.state.query(sql, Vec::new())
    }

    fn execute_update(&mut self, sql: &str) -> DriverResult<i64> {
        self.state.update(sql, Vec::new())
    }

    fn execute(&mut self, sql: &str) -> DriverResult<bool> {
        self.state.execute(sql, Vec::new())
    }
}

pub struct SqlitePreparedStatement {
    state: StatementState,
    sql: String,
    parameters: Vec<Option<SqlValue>>,
}

impl SqlitePreparedStatement {
    fn bound_parameters(&self) -> DriverResult<Vec<SqlValue>> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.clone().ok_or_else(|| {
                    DriverError::new(format!("No value specified for parameter {}", i + 1))
                })
            })
            .collect()
    }
}

impl_statement_options!(SqlitePreparedStatement);

impl DbPreparedStatement for SqlitePreparedStatement {
    fn set_parameter(&mut self, index: usize, value: Value) -> DriverResult<()> {
        self.state.ensure_open()?;
        if index == 0 || index > self.parameters.len() {
            return Err(DriverError::new(format!(
                "Parameter index {} out of range (1..={})",
                index,
                self.parameters.len()
            )));
        }
        self.parameters[index - 1] = Some(to_sql_value(&value)?);
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.parameters.iter_mut().for_each(|p| *p = None);
    }

    fn execute_query(&mut self) -> DriverResult<Box<dyn DbResultSet>> {
        let params = self.bound_parameters()?;
        self.state.query(&self.sql, params)
    }

    fn execute_update(&mut self) -> DriverResult<i64> {
        let params = self.bound_parameters()?;
        self.state.update(&self.sql, params)
    }

    fn execute(&mut self) -> DriverResult<bool> {
        let params = self.bound_parameters()?;
        self.state.execute(&self.sql, params)
    }
}

/// Result set over one live cursor, read `fetch_size` rows per worker call
struct SqliteResultSet {
    worker: Worker,
    cursor: u64,
    columns: Arc<Vec<ColumnDescriptor>>,
    fetch_size: usize,
    max_rows: usize,
    delivered: usize,
    buffer: VecDeque<Vec<Value>>,
    drained: bool,
    closed: bool,
}

impl SqliteResultSet {
    fn fill(&mut self) -> DriverResult<()> {
        let mut limit = self.fetch_size;
        if self.max_rows > 0 {
            limit = limit.min(self.max_rows - self.delivered);
        }
        let id = self.cursor;
        let columns = self.columns.clone();
        let (rows, drained) = self
            .worker
            .call(move |session| session.read_cursor(id, limit, &columns))?;
        self.drained = drained;
        self.buffer.extend(rows);
        Ok(())
    }

    /// Drop the worker-side cursor if it is still open
    fn release_cursor(&mut self) {
        if self.drained {
            return;
        }
        self.drained = true;
        let id = self.cursor;
        self.worker.post(move |session| {
            session.cursors.remove(&id);
        });
    }
}

impl DbResultSet for SqliteResultSet {
    fn metadata(&mut self) -> DriverResult<Vec<ColumnDescriptor>> {
        if self.closed {
            return Err(DriverError::closed("result set"));
        }
        Ok(self.columns.as_ref().clone())
    }

    fn next_row(&mut self) -> DriverResult<Option<Vec<Value>>> {
        if self.closed {
            return Err(DriverError::closed("result set"));
        }
        if self.max_rows > 0 && self.delivered >= self.max_rows {
            self.release_cursor();
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.drained {
            self.fill()?;
        }
        let row = self.buffer.pop_front();
        if row.is_some() {
            self.delivered += 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.buffer.clear();
        self.release_cursor();
        Ok(())
    }
}

impl Drop for SqliteResultSet {
    fn drop(&mut self) {
        self.release_cursor();
    }
}

/// Rows of a writing statement (INSERT ... RETURNING), read in full at execution
struct EagerResultSet {
    columns: Vec<ColumnDescriptor>,
    rows: VecDeque<Vec<Value>>,
    closed: bool,
}

impl DbResultSet for EagerResultSet {
    fn metadata(&mut self) -> DriverResult<Vec<ColumnDescriptor>> {
        if self.closed {
            return Err(DriverError::closed("result set"));
        }
        Ok(self.columns.clone())
    }

    fn next_row(&mut self) -> DriverResult<Option<Vec<Value>>> {
        if self.closed {
            return Err(DriverError::closed("result set"));
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

fn describe_columns(stmt: &rusqlite::Statement<'_>) -> Vec<ColumnDescriptor> {
    stmt.columns()
        .iter()
        .map(|column| {
            let decl = column.decl_type();
            let (precision, scale) = declared_size(decl);
            ColumnDescriptor {
                name: column.name().to_string(),
                sql_type: SqlType::from_declared(decl),
                precision,
                scale,
                nullable: Nullability::Unknown,
            }
        })
        .collect()
}

/// `VARCHAR(64)` -> (64, 0), `DECIMAL(10,2)` -> (10, 2)
fn declared_size(decl: Option<&str>) -> (u32, u32) {
    let Some(args) = decl
        .and_then(|d| d.split_once('('))
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(args, _)| args)
    else {
        return (0, 0);
    };
    let mut parts = args.split(',').map(|p| p.trim().parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

fn decode_row(row: &rusqlite::Row<'_>, columns: &[ColumnDescriptor]) -> DriverResult<Vec<Value>> {
    (0..columns.len())
        .map(|idx| Ok(decode_value(row.get_ref(idx)?, columns[idx].sql_type)))
        .collect()
}

fn decode_value(value: ValueRef<'_>, sql_type: SqlType) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match sql_type {
            SqlType::Boolean => Value::Bool(i != 0),
            SqlType::Timestamp => DateTime::from_timestamp(i, 0)
                .map(Value::Timestamp)
                .unwrap_or(Value::Long(i)),
            SqlType::Integer => i32::try_from(i).map(Value::Int).unwrap_or(Value::Long(i)),
            _ => Value::Long(i),
        },
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if sql_type == SqlType::Timestamp {
                if let Some(ts) = parse_timestamp(&text) {
                    return Value::Timestamp(ts);
                }
            }
            Value::String(text.into_owned())
        }
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn to_sql_value(value: &Value) -> DriverResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(i64::from(*i)),
        Value::Long(l) => SqlValue::Integer(*l),
        Value::Double(d) => SqlValue::Real(*d),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        other => {
            return Err(DriverError::new(format!(
                "Cannot bind a {} value as a parameter",
                other.type_name()
            )))
        }
    })
}
