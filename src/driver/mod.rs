//! Remote-object protocol endpoint
//!
//! Clients reach the server over one persistent TCP link per client process.
//! Every server-side database object they hold is addressed by an opaque
//! integer key; each request names a key, the object's class and an
//! operation, and every response echoes those fields back.
//!
//! # Protocol Overview
//!
//! - **Magic Header**: `dbagent-rpc-v1\0` (15 bytes, sent once by the client)
//! - **Request Frame**: `[length: 4 bytes BE][msgpack payload]`
//! - **Response Frame**: `[length: 4 bytes BE][msgpack payload]`
//!
//! Responses may arrive out of order; the client matches them to callers by
//! `correlation_id`.

pub use dbagent_client::protocol::{
    decode_message, encode_response, ops, AgentError, ClassType, ColumnDescriptor,
    ErrorDescriptor, ErrorKind, Nullability, ObjectKey, Outcome, Request, Response, ResultBatch,
    SqlType, Value, DRIVER_MAGIC, MAX_MESSAGE_SIZE,
};

pub mod dispatcher;
pub mod handler;
pub mod operation;

pub use dispatcher::Dispatcher;
pub use handler::{spawn_link_handler, LinkHandler};
