//! Wire protocol shared by the client driver and the server
//!
//! Uses MessagePack for efficient binary serialization.

pub mod codec;
pub mod error;
pub mod message;
pub mod value;

pub use codec::{
    decode_message, encode_message, encode_request, encode_response, DRIVER_MAGIC,
    MAX_MESSAGE_SIZE,
};
pub use error::{AgentError, ErrorDescriptor, ErrorKind};
pub use message::{ops, Outcome, Request, Response};
pub use value::{ClassType, ColumnDescriptor, Nullability, ObjectKey, ResultBatch, SqlType, Value};
