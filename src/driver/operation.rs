//! Operation tables
//!
//! Each request is parsed into a typed operation for its class before
//! anything touches the registry. Unknown names, wrong arity and wrongly
//! typed arguments all fail here.

use std::time::Duration;

use super::{ops, ClassType, Value};
use crate::error::{ServerError, ServerResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectArgs {
    pub catalog: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// `None` (absent, null or 0) selects the server default
    pub idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOp {
    CreateStatement,
    PrepareStatement(String),
    SetAutoCommit(bool),
    GetAutoCommit,
    Commit,
    Rollback,
    IsValid,
    IsClosed,
    GetCatalog,
    Close,
    Release,
}

/// Accessors shared by Statement and PreparedStatement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementCommon {
    GetResultSet,
    GetUpdateCount,
    SetMaxRows(usize),
    GetMaxRows,
    SetFetchSize(usize),
    GetFetchSize,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementOp {
    ExecuteQuery(String),
    ExecuteUpdate(String),
    Execute(String),
    Common(StatementCommon),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreparedOp {
    SetParameter(usize, Value),
    ClearParameters,
    ExecuteQuery,
    ExecuteUpdate,
    Execute,
    Common(StatementCommon),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultSetOp {
    FetchMetadata,
    /// 0 selects the default batch size
    FetchBatch(usize),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Connection(ConnectionOp),
    Statement(StatementOp),
    Prepared(PreparedOp),
    ResultSet(ResultSetOp),
}

impl Operation {
    pub fn parse(class_type: ClassType, name: &str, args: Vec<Value>) -> ServerResult<Self> {
        let args = Args::new(name, args);
        Ok(match class_type {
            ClassType::Connection => Operation::Connection(parse_connection(args)?),
            ClassType::Statement => Operation::Statement(parse_statement(args)?),
            ClassType::PreparedStatement => Operation::Prepared(parse_prepared(args)?),
            ClassType::ResultSet => Operation::ResultSet(parse_result_set(args)?),
        })
    }

    /// Close or release: handled by the registry, not the live object
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            Operation::Connection(ConnectionOp::Close | ConnectionOp::Release)
                | Operation::Statement(StatementOp::Common(StatementCommon::Close))
                | Operation::Prepared(PreparedOp::Common(StatementCommon::Close))
                | Operation::ResultSet(ResultSetOp::Close)
        )
    }
}

impl ConnectArgs {
    /// `connect(catalog, user, password, idleTimeoutMs)`; the last three may be null
    pub fn parse(name: &str, args: Vec<Value>) -> ServerResult<Self> {
        if name != ops::CONNECT {
            return Err(ServerError::Bootstrap(format!(
                "Only '{}' is allowed without a target key, got '{}'",
                ops::CONNECT,
                name
            )));
        }
        let mut args = Args::new(name, args);
        args.arity_between(1, 4)?;
        let catalog = args.string(0)?;
        let user = args.optional_string(1)?;
        let password = args.optional_string(2)?;
        let idle_timeout = match args.get(3) {
            None | Some(Value::Null) => None,
            Some(_) => {
                let ms = args.long(3)?;
                match u64::try_from(ms) {
                    Ok(0) => None,
                    Ok(ms) => Some(Duration::from_millis(ms)),
                    Err(_) => return Err(args.bad(3, "a non-negative timeout")),
                }
            }
        };
        Ok(ConnectArgs {
            catalog,
            user,
            password,
            idle_timeout,
        })
    }
}

fn parse_connection(mut args: Args) -> ServerResult<ConnectionOp> {
    let name = args.name.clone();
    let op = match name.as_str() {
        ops::CREATE_STATEMENT => args.none(ConnectionOp::CreateStatement)?,
        ops::PREPARE_STATEMENT => {
            args.arity(1)?;
            ConnectionOp::PrepareStatement(args.string(0)?)
        }
        ops::SET_AUTO_COMMIT => {
            args.arity(1)?;
            ConnectionOp::SetAutoCommit(args.bool(0)?)
        }
        ops::GET_AUTO_COMMIT => args.none(ConnectionOp::GetAutoCommit)?,
        ops::COMMIT => args.none(ConnectionOp::Commit)?,
        ops::ROLLBACK => args.none(ConnectionOp::Rollback)?,
        // isValid(timeoutSeconds) is accepted and the timeout ignored
        ops::IS_VALID => {
            args.arity_between(0, 1)?;
            ConnectionOp::IsValid
        }
        ops::IS_CLOSED => args.none(ConnectionOp::IsClosed)?,
        ops::GET_CATALOG => args.none(ConnectionOp::GetCatalog)?,
        ops::CLOSE => args.none(ConnectionOp::Close)?,
        ops::RELEASE => args.none(ConnectionOp::Release)?,
        _ => return Err(args.unknown(ClassType::Connection)),
    };
    Ok(op)
}

fn parse_common(args: &Args, class_type: ClassType) -> ServerResult<StatementCommon> {
    let name = args.name.clone();
    let op = match name.as_str() {
        ops::GET_RESULT_SET => args.none(StatementCommon::GetResultSet)?,
        ops::GET_UPDATE_COUNT => args.none(StatementCommon::GetUpdateCount)?,
        ops::SET_MAX_ROWS => {
            args.arity(1)?;
            StatementCommon::SetMaxRows(args.count(0)?)
        }
        ops::GET_MAX_ROWS => args.none(StatementCommon::GetMaxRows)?,
        ops::SET_FETCH_SIZE => {
            args.arity(1)?;
            StatementCommon::SetFetchSize(args.count(0)?)
        }
        ops::GET_FETCH_SIZE => args.none(StatementCommon::GetFetchSize)?,
        ops::CLOSE => args.none(StatementCommon::Close)?,
        _ => return Err(args.unknown(class_type)),
    };
    Ok(op)
}

fn parse_statement(mut args: Args) -> ServerResult<StatementOp> {
    let name = args.name.clone();
    let op = match name.as_str() {
        ops::EXECUTE_QUERY => {
            args.arity(1)?;
            StatementOp::ExecuteQuery(args.string(0)?)
        }
        ops::EXECUTE_UPDATE => {
            args.arity(1)?;
            StatementOp::ExecuteUpdate(args.string(0)?)
        }
        ops::EXECUTE => {
            args.arity(1)?;
            StatementOp::Execute(args.string(0)?)
        }
        _ => StatementOp::Common(parse_common(&args, ClassType::Statement)?),
    };
    Ok(op)
}

fn parse_prepared(args: Args) -> ServerResult<PreparedOp> {
    let name = args.name.clone();
    let op = match name.as_str() {
        ops::SET_NULL => {
            // setNull(index[, sqlType])
            args.arity_between(1, 2)?;
            PreparedOp::SetParameter(args.index(0)?, Value::Null)
        }
        ops::SET_BOOLEAN => args.setter(|v| v.as_bool().map(Value::Bool), "a boolean")?,
        ops::SET_INT => args.setter(|v| v.as_i32().map(Value::Int), "an int")?,
        ops::SET_LONG => args.setter(|v| v.as_i64().map(Value::Long), "a long")?,
        ops::SET_DOUBLE => args.setter(|v| v.as_f64().map(Value::Double), "a double")?,
        ops::SET_STRING => args.setter(
            |v| match v {
                Value::String(_) | Value::Null => Some(v.clone()),
                _ => None,
            },
            "a string",
        )?,
        ops::SET_BYTES => args.setter(
            |v| match v {
                Value::Bytes(_) | Value::Null => Some(v.clone()),
                _ => None,
            },
            "bytes",
        )?,
        ops::SET_TIMESTAMP => args.setter(
            |v| match v {
                Value::Timestamp(_) | Value::Null => Some(v.clone()),
                _ => None,
            },
            "a timestamp",
        )?,
        ops::SET_OBJECT => args.setter(
            |v| match v {
                Value::Key(_) | Value::Metadata(_) | Value::Batch(_) => None,
                scalar => Some(scalar.clone()),
            },
            "a scalar value",
        )?,
        ops::CLEAR_PARAMETERS => args.none(PreparedOp::ClearParameters)?,
        ops::EXECUTE_QUERY => args.none(PreparedOp::ExecuteQuery)?,
        ops::EXECUTE_UPDATE => args.none(PreparedOp::ExecuteUpdate)?,
        ops::EXECUTE => args.none(PreparedOp::Execute)?,
        _ => PreparedOp::Common(parse_common(&args, ClassType::PreparedStatement)?),
    };
    Ok(op)
}

fn parse_result_set(args: Args) -> ServerResult<ResultSetOp> {
    let name = args.name.clone();
    let op = match name.as_str() {
        ops::FETCH_METADATA => args.none(ResultSetOp::FetchMetadata)?,
        ops::FETCH_BATCH => {
            args.arity(1)?;
            ResultSetOp::FetchBatch(args.count(0)?)
        }
        ops::CLOSE => args.none(ResultSetOp::Close)?,
        _ => return Err(args.unknown(ClassType::ResultSet)),
    };
    Ok(op)
}

/// Argument list of one request, with the checks the tables above share
struct Args {
    name: String,
    values: Vec<Value>,
}

impl Args {
    fn new(name: &str, values: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }

    fn get(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }

    fn bad(&self, i: usize, expected: &str) -> ServerError {
        let got = self.values.get(i).map(Value::type_name).unwrap_or("nothing");
        ServerError::BadArgument {
            operation: self.name.clone(),
            message: format!("argument {} must be {}, got {}", i + 1, expected, got),
        }
    }

    fn unknown(&self, class_type: ClassType) -> ServerError {
        ServerError::UnknownOperation {
            class_type: class_type.to_string(),
            operation: self.name.clone(),
        }
    }

    fn arity(&self, n: usize) -> ServerResult<()> {
        self.arity_between(n, n)
    }

    fn arity_between(&self, min: usize, max: usize) -> ServerResult<()> {
        let n = self.values.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(ServerError::BadArgument {
                operation: self.name.clone(),
                message: format!("expected {} arguments, got {}", expected, n),
            });
        }
        Ok(())
    }

    fn none<T>(&self, op: T) -> ServerResult<T> {
        self.arity(0)?;
        Ok(op)
    }

    fn string(&mut self, i: usize) -> ServerResult<String> {
        match self.values.get_mut(i) {
            Some(Value::String(s)) => Ok(std::mem::take(s)),
            _ => Err(self.bad(i, "a string")),
        }
    }

    fn optional_string(&mut self, i: usize) -> ServerResult<Option<String>> {
        match self.values.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.string(i).map(Some),
        }
    }

    fn bool(&self, i: usize) -> ServerResult<bool> {
        match self.values.get(i) {
            Some(Value::Bool(b)) => Ok(*b),
            _ => Err(self.bad(i, "a boolean")),
        }
    }

    fn long(&self, i: usize) -> ServerResult<i64> {
        self.values
            .get(i)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.bad(i, "an integer"))
    }

    /// Non-negative count such as a row limit
    fn count(&self, i: usize) -> ServerResult<usize> {
        let n = self.long(i)?;
        usize::try_from(n).map_err(|_| self.bad(i, "a non-negative integer"))
    }

    /// 1-based parameter index
    fn index(&self, i: usize) -> ServerResult<usize> {
        match self.count(i)? {
            0 => Err(self.bad(i, "a parameter index starting at 1")),
            n => Ok(n),
        }
    }

    fn setter(
        &self,
        convert: impl Fn(&Value) -> Option<Value>,
        expected: &str,
    ) -> ServerResult<PreparedOp> {
        self.arity(2)?;
        let index = self.index(0)?;
        let value = self
            .values
            .get(1)
            .and_then(convert)
            .ok_or_else(|| self.bad(1, expected))?;
        Ok(PreparedOp::SetParameter(index, value))
    }
}
