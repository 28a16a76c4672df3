//! Request dispatch
//!
//! Turns one decoded request into one response. A request without a target
//! key is the bootstrap `connect`; anything else is resolved through the
//! registry and run against the live object under that object's lock.
//! Database calls block, so they run on the blocking pool with the owned
//! guard moved in and handed back.

use std::sync::Arc;

use super::operation::{
    ConnectArgs, ConnectionOp, Operation, PreparedOp, ResultSetOp, StatementCommon, StatementOp,
};
use super::{ClassType, ObjectKey, Outcome, Request, Response, Value};
use crate::database::{DbConnection, DbPreparedStatement, DbStatement, StatementOptions};
use crate::error::{ServerError, ServerResult};
use crate::server::context::AgentContext;
use crate::server::cursor::Cursor;
use crate::server::registry::{LiveObject, RegistryEntry};

/// What a call on a live object produced
enum Invocation {
    Value(Value),
    /// A new object owned by the target; registered as its child
    Child(LiveObject),
}

#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<AgentContext>,
}

impl Dispatcher {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self { context }
    }

    /// Handle one request. Failures are reported in the response, never raised.
    pub async fn handle(&self, request: Request) -> Response {
        let Request {
            correlation_id,
            target_key,
            class_type,
            operation,
            arguments,
        } = request;

        let result = match target_key {
            None => self.connect(class_type, &operation, arguments).await,
            Some(key) => self.invoke(key, class_type, &operation, arguments).await,
        };

        let outcome = match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => {
                match &e {
                    ServerError::Bootstrap(_) => tracing::warn!("{} failed: {}", operation, e),
                    _ => tracing::debug!("{} on {:?} failed: {}", operation, target_key, e),
                }
                Outcome::Failure(e.descriptor())
            }
        };

        Response {
            correlation_id,
            target_key,
            class_type,
            operation,
            outcome,
        }
    }

    async fn connect(
        &self,
        class_type: ClassType,
        operation: &str,
        arguments: Vec<Value>,
    ) -> ServerResult<Value> {
        if class_type != ClassType::Connection {
            return Err(ServerError::Bootstrap(format!(
                "A request without a target key must address a Connection, not a {}",
                class_type
            )));
        }
        let args = ConnectArgs::parse(operation, arguments)?;
        let idle_timeout = args
            .idle_timeout
            .unwrap_or_else(|| self.context.settings.default_idle_timeout());

        let datasources = self.context.datasources.clone();
        let catalog = args.catalog.clone();
        let conn = tokio::task::spawn_blocking(move || {
            datasources.checkout(&args.catalog, args.user.as_deref(), args.password.as_deref())
        })
        .await??;

        let key = self
            .context
            .registry
            .register_root(LiveObject::Connection(conn), idle_timeout)
            .await?;
        tracing::info!(
            "Opened session {} on catalog '{}' (idle timeout {:?})",
            key,
            catalog,
            idle_timeout
        );
        Ok(Value::Key(key))
    }

    async fn invoke(
        &self,
        key: ObjectKey,
        class_type: ClassType,
        operation: &str,
        arguments: Vec<Value>,
    ) -> ServerResult<Value> {
        let registry = &self.context.registry;
        let entry = registry.resolve(key)?;
        if entry.class_type != class_type {
            return Err(ServerError::BadArgument {
                operation: operation.to_string(),
                message: format!("object {} is a {}, not a {}", key, entry.class_type, class_type),
            });
        }
        let op = Operation::parse(class_type, operation, arguments)?;

        let guard = registry.acquire(&entry).await?;
        registry.touch(&entry);

        if op.is_close() {
            registry.close_held(&entry, guard).await;
            if entry.is_root() {
                tracing::info!("Session {} {}", key, operation);
            }
            return Ok(Value::Null);
        }

        let (guard, result) = tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            let result = match guard.as_mut() {
                Some(object) => apply(object, op),
                None => Err(ServerError::StaleReference(key)),
            };
            (guard, result)
        })
        .await?;
        registry.touch(&entry);

        match result? {
            Invocation::Value(value) => Ok(value),
            Invocation::Child(object) => {
                let child = register_under(&self.context, &entry, object).await;
                drop(guard);
                Ok(Value::Key(child?))
            }
        }
    }
}

/// Register a child while the caller still holds the parent's guard, so a
/// concurrent close of the parent cannot miss it
async fn register_under(
    context: &AgentContext,
    parent: &RegistryEntry,
    object: LiveObject,
) -> ServerResult<ObjectKey> {
    let class_type = object.class_type();
    let key = context.registry.register_child(parent, object).await?;
    tracing::debug!("Registered {} {} under {}", class_type, key, parent.key);
    Ok(key)
}

fn apply(object: &mut LiveObject, op: Operation) -> ServerResult<Invocation> {
    match (object, op) {
        (LiveObject::Connection(conn), Operation::Connection(op)) => connection_op(conn.as_mut(), op),
        (LiveObject::Statement(stmt), Operation::Statement(op)) => statement_op(stmt.as_mut(), op),
        (LiveObject::PreparedStatement(stmt), Operation::Prepared(op)) => {
            prepared_op(stmt.as_mut(), op)
        }
        (LiveObject::ResultSet(cursor), Operation::ResultSet(op)) => result_set_op(cursor, op),
        (object, op) => Err(ServerError::Internal(format!(
            "{:?} does not apply to a {}",
            op,
            object.class_type()
        ))),
    }
}

fn closed_by_registry() -> ServerError {
    ServerError::Internal("close is handled by the registry".into())
}

fn connection_op(conn: &mut dyn DbConnection, op: ConnectionOp) -> ServerResult<Invocation> {
    let value = match op {
        ConnectionOp::CreateStatement => {
            return Ok(Invocation::Child(LiveObject::Statement(conn.create_statement()?)));
        }
        ConnectionOp::PrepareStatement(sql) => {
            let stmt = conn.prepare_statement(&sql)?;
            return Ok(Invocation::Child(LiveObject::PreparedStatement(stmt)));
        }
        ConnectionOp::SetAutoCommit(on) => {
            conn.set_auto_commit(on)?;
            Value::Null
        }
        ConnectionOp::GetAutoCommit => Value::Bool(conn.auto_commit()?),
        ConnectionOp::Commit => {
            conn.commit()?;
            Value::Null
        }
        ConnectionOp::Rollback => {
            conn.rollback()?;
            Value::Null
        }
        ConnectionOp::IsValid => Value::Bool(conn.is_valid()),
        ConnectionOp::IsClosed => Value::Bool(conn.is_closed()),
        ConnectionOp::GetCatalog => Value::String(conn.catalog()?),
        ConnectionOp::Close | ConnectionOp::Release => return Err(closed_by_registry()),
    };
    Ok(Invocation::Value(value))
}

fn count(n: usize) -> Value {
    Value::Long(i64::try_from(n).unwrap_or(i64::MAX))
}

fn common_op<S: StatementOptions + ?Sized>(
    stmt: &mut S,
    op: StatementCommon,
) -> ServerResult<Invocation> {
    let value = match op {
        StatementCommon::GetResultSet => {
            return Ok(match stmt.take_result_set()? {
                Some(rs) => Invocation::Child(LiveObject::ResultSet(Cursor::new(rs))),
                None => Invocation::Value(Value::Null),
            });
        }
        StatementCommon::GetUpdateCount => Value::Long(stmt.update_count()),
        StatementCommon::SetMaxRows(n) => {
            stmt.set_max_rows(n)?;
            Value::Null
        }
        StatementCommon::GetMaxRows => count(stmt.max_rows()),
        StatementCommon::SetFetchSize(n) => {
            stmt.set_fetch_size(n)?;
            Value::Null
        }
        StatementCommon::GetFetchSize => count(stmt.fetch_size()),
        StatementCommon::Close => return Err(closed_by_registry()),
    };
    Ok(Invocation::Value(value))
}

fn statement_op(stmt: &mut dyn DbStatement, op: StatementOp) -> ServerResult<Invocation> {
    Ok(match op {
        StatementOp::ExecuteQuery(sql) => {
            let rs = stmt.execute_query(&sql)?;
            Invocation::Child(LiveObject::ResultSet(Cursor::new(rs)))
        }
        StatementOp::ExecuteUpdate(sql) => Invocation::Value(Value::Long(stmt.execute_update(&sql)?)),
        StatementOp::Execute(sql) => Invocation::Value(Value::Bool(stmt.execute(&sql)?)),
        StatementOp::Common(op) => return common_op(stmt, op),
    })
}

fn prepared_op(stmt: &mut dyn DbPreparedStatement, op: PreparedOp) -> ServerResult<Invocation> {
    Ok(match op {
        PreparedOp::SetParameter(index, value) => {
            stmt.set_parameter(index, value)?;
            Invocation::Value(Value::Null)
        }
        PreparedOp::ClearParameters => {
            stmt.clear_parameters();
            Invocation::Value(Value::Null)
        }
        PreparedOp::ExecuteQuery => {
            let rs = stmt.execute_query()?;
            Invocation::Child(LiveObject::ResultSet(Cursor::new(rs)))
        }
        PreparedOp::ExecuteUpdate => Invocation::Value(Value::Long(stmt.execute_update()?)),
        PreparedOp::Execute => Invocation::Value(Value::Bool(stmt.execute()?)),
        PreparedOp::Common(op) => return common_op(stmt, op),
    })
}

fn result_set_op(cursor: &mut Cursor, op: ResultSetOp) -> ServerResult<Invocation> {
    let value = match op {
        ResultSetOp::FetchMetadata => Value::Metadata(cursor.metadata()?),
        ResultSetOp::FetchBatch(max_rows) => Value::Batch(cursor.fetch_batch(max_rows)?),
        ResultSetOp::Close => return Err(closed_by_registry()),
    };
    Ok(Invocation::Value(value))
}
