use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error kinds carried on the wire inside a failure response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Undecodable frame; the link that produced it is closed
    MalformedMessage,
    /// Key unknown or already closed/evicted
    StaleReference,
    /// No physical database connection could be obtained
    BootstrapFailure,
    /// The database call itself failed
    OperationFailure,
    /// Client-local: no response within the call timeout
    TransportTimeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedMessage => "malformed message",
            ErrorKind::StaleReference => "stale reference",
            ErrorKind::BootstrapFailure => "bootstrap failure",
            ErrorKind::OperationFailure => "operation failure",
            ErrorKind::TransportTimeout => "transport timeout",
        };
        f.write_str(name)
    }
}

/// Failure payload of a response. Never a serialized server-side error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    /// Vendor error code reported by the database, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: Option<i32>) -> Self {
        self.code = code;
        self
    }
}

/// Errors surfaced by the client driver
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Stale reference: {0}")]
    StaleReference(String),

    #[error("Bootstrap failure: {0}")]
    BootstrapFailure(String),

    /// Database error text is surfaced verbatim
    #[error("{message}")]
    OperationFailure { message: String, code: Option<i32> },

    #[error("Call timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Message too large")]
    MessageTooLarge,

    #[error("Invalid connection string: {0}")]
    InvalidUrl(String),

    #[error("Directory lookup failed: {0}")]
    DirectoryLookup(String),
}

impl AgentError {
    /// Wire kind of this error, if it has one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AgentError::MalformedMessage(_) => Some(ErrorKind::MalformedMessage),
            AgentError::StaleReference(_) => Some(ErrorKind::StaleReference),
            AgentError::BootstrapFailure(_) | AgentError::DirectoryLookup(_) => {
                Some(ErrorKind::BootstrapFailure)
            }
            AgentError::OperationFailure { .. } => Some(ErrorKind::OperationFailure),
            AgentError::TransportTimeout(_) => Some(ErrorKind::TransportTimeout),
            AgentError::ConnectionError(_)
            | AgentError::MessageTooLarge
            | AgentError::InvalidUrl(_) => None,
        }
    }

    pub fn is_stale_reference(&self) -> bool {
        matches!(self, AgentError::StaleReference(_))
    }
}

impl From<ErrorDescriptor> for AgentError {
    fn from(desc: ErrorDescriptor) -> Self {
        match desc.kind {
            ErrorKind::MalformedMessage => AgentError::MalformedMessage(desc.message),
            ErrorKind::StaleReference => AgentError::StaleReference(desc.message),
            ErrorKind::BootstrapFailure => AgentError::BootstrapFailure(desc.message),
            ErrorKind::OperationFailure => AgentError::OperationFailure {
                message: desc.message,
                code: desc.code,
            },
            // The server never sends this kind; keep the text anyway
            ErrorKind::TransportTimeout => AgentError::ConnectionError(desc.message),
        }
    }
}
