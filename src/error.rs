use thiserror::Error;

use crate::database::DriverError;
use crate::driver::{ErrorDescriptor, ErrorKind, ObjectKey};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Object {0} is not registered (closed, evicted or never allocated)")]
    StaleReference(ObjectKey),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("{0}")]
    Driver(#[from] DriverError),

    #[error("Unknown operation '{operation}' on {class_type}")]
    UnknownOperation {
        class_type: String,
        operation: String,
    },

    #[error("Bad argument for '{operation}': {message}")]
    BadArgument { operation: String, message: String },

    #[error("Object key space exhausted")]
    KeysExhausted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::StaleReference(_) => ErrorKind::StaleReference,
            ServerError::Bootstrap(_) | ServerError::Config(_) | ServerError::KeysExhausted => {
                ErrorKind::BootstrapFailure
            }
            _ => ErrorKind::OperationFailure,
        }
    }

    /// Wire form; database errors keep their message and vendor code verbatim
    pub fn descriptor(&self) -> ErrorDescriptor {
        match self {
            ServerError::Driver(e) => {
                ErrorDescriptor::new(ErrorKind::OperationFailure, e.message.clone()).with_code(e.code)
            }
            other => ErrorDescriptor::new(other.kind(), other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("Driver task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_kinds() {
        let stale = ServerError::StaleReference(ObjectKey(7)).descriptor();
        assert_eq!(stale.kind, ErrorKind::StaleReference);
        assert!(stale.message.contains("#7"));

        let boot = ServerError::Bootstrap("unknown catalog 'nope'".into()).descriptor();
        assert_eq!(boot.kind, ErrorKind::BootstrapFailure);

        let unknown = ServerError::UnknownOperation {
            class_type: "Statement".into(),
            operation: "frobnicate".into(),
        };
        assert_eq!(unknown.descriptor().kind, ErrorKind::OperationFailure);
    }

    #[test]
    fn test_driver_error_keeps_code() {
        let err = ServerError::from(DriverError::new("no such table: t_missing").with_code(1));
        let desc = err.descriptor();
        assert_eq!(desc.kind, ErrorKind::OperationFailure);
        assert_eq!(desc.message, "no such table: t_missing");
        assert_eq!(desc.code, Some(1));
    }
}
