use super::error::ErrorDescriptor;
use super::value::{ClassType, ObjectKey, Value};
use serde::{Deserialize, Serialize};

/// A call against a remote object, or the bootstrap call when `target_key` is absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Transport-level id used to route the response back to its caller
    pub correlation_id: u64,
    #[serde(default)]
    pub target_key: Option<ObjectKey>,
    pub class_type: ClassType,
    pub operation: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Request {
    pub fn new(
        target_key: Option<ObjectKey>,
        class_type: ClassType,
        operation: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            correlation_id: 0,
            target_key,
            class_type,
            operation: operation.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(ErrorDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub correlation_id: u64,
    #[serde(default)]
    pub target_key: Option<ObjectKey>,
    pub class_type: ClassType,
    /// Echo of the request's operation name
    pub operation: String,
    pub outcome: Outcome,
}

impl Response {
    /// Build a response echoing the addressing fields of `request`
    pub fn reply(request: &Request, outcome: Outcome) -> Self {
        Self {
            correlation_id: request.correlation_id,
            target_key: request.target_key,
            class_type: request.class_type,
            operation: request.operation.clone(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }
}

/// Operation names understood by the server
pub mod ops {
    pub const CONNECT: &str = "connect";

    pub const CREATE_STATEMENT: &str = "createStatement";
    pub const PREPARE_STATEMENT: &str = "prepareStatement";
    pub const SET_AUTO_COMMIT: &str = "setAutoCommit";
    pub const GET_AUTO_COMMIT: &str = "getAutoCommit";
    pub const COMMIT: &str = "commit";
    pub const ROLLBACK: &str = "rollback";
    pub const IS_VALID: &str = "isValid";
    pub const IS_CLOSED: &str = "isClosed";
    pub const GET_CATALOG: &str = "getCatalog";
    pub const RELEASE: &str = "release";
    pub const CLOSE: &str = "close";

    pub const EXECUTE_QUERY: &str = "executeQuery";
    pub const EXECUTE_UPDATE: &str = "executeUpdate";
    pub const EXECUTE: &str = "execute";
    pub const GET_RESULT_SET: &str = "getResultSet";
    pub const GET_UPDATE_COUNT: &str = "getUpdateCount";
    pub const SET_MAX_ROWS: &str = "setMaxRows";
    pub const GET_MAX_ROWS: &str = "getMaxRows";
    pub const SET_FETCH_SIZE: &str = "setFetchSize";
    pub const GET_FETCH_SIZE: &str = "getFetchSize";

    pub const SET_NULL: &str = "setNull";
    pub const SET_BOOLEAN: &str = "setBoolean";
    pub const SET_INT: &str = "setInt";
    pub const SET_LONG: &str = "setLong";
    pub const SET_DOUBLE: &str = "setDouble";
    pub const SET_STRING: &str = "setString";
    pub const SET_BYTES: &str = "setBytes";
    pub const SET_TIMESTAMP: &str = "setTimestamp";
    pub const SET_OBJECT: &str = "setObject";
    pub const CLEAR_PARAMETERS: &str = "clearParameters";

    pub const FETCH_METADATA: &str = "fetchMetadata";
    pub const FETCH_BATCH: &str = "fetchBatch";
}
