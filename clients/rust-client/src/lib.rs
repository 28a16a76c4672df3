//! dbagent Rust client
//!
//! Remote database handles whose every call is executed by a dbagent server.
//! Connections, statements and result sets are thin proxies holding an
//! object key; the server owns the physical connections.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbagent_client::ConnectionBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dbagent_client::AgentError> {
//!     let conn = ConnectionBuilder::new("jdbc:agent:127.0.0.1:6543/mytest")
//!         .auth("root", "secret")
//!         .connect()
//!         .await?;
//!
//!     let stmt = conn.create_statement().await?;
//!     let mut rs = stmt.execute_query("SELECT id, name FROM t_user").await?;
//!     while let Some(row) = rs.next().await? {
//!         println!("{:?}", row.values());
//!     }
//!     rs.close().await?;
//!     stmt.close().await?;
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod pool;
pub mod protocol;

pub use client::{
    AgentDriver, ConnectProperties, ConnectionBuilder, ConnectionUrl, DirectoryLookup,
    RemoteConnection, RemotePreparedStatement, RemoteResultSet, RemoteStatement, Row,
    ServerAddress, StaticDirectory, Transport,
};
pub use pool::{AgentPool, PooledConnection, RemoteConnectionManager, RemoteSession};
pub use protocol::{AgentError, ErrorKind, ObjectKey, Value};
