//! Client-side proxies for remote database handles
//!
//! Each proxy holds only an object key and a shared link. Calls become
//! requests; successful responses are unpacked into plain values or into new
//! proxies bound to the keys the server minted.

mod builder;
mod connection;
pub mod discovery;
pub mod properties;
mod result_set;
mod statement;
pub mod transport;
pub mod url;

pub use builder::ConnectionBuilder;
pub use connection::RemoteConnection;
pub use discovery::{DirectoryLookup, StaticDirectory};
pub use properties::ConnectProperties;
pub use result_set::{RemoteResultSet, Row};
pub use statement::{RemotePreparedStatement, RemoteStatement};
pub use transport::Transport;
pub use url::{ConnectionUrl, ServerAddress};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{
    ops, AgentError, ClassType, ObjectKey, Outcome, Request, Response, Value,
};

/// Entry point for opening remote connections.
///
/// Links are cached per server address and shared by every session opened
/// through the same driver.
pub struct AgentDriver {
    directory: Option<Arc<dyn DirectoryLookup>>,
    links: DashMap<String, Arc<Transport>>,
    link_lock: tokio::sync::Mutex<()>,
}

impl Default for AgentDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentDriver {
    pub fn new() -> Self {
        Self {
            directory: None,
            links: DashMap::new(),
            link_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_directory(directory: Arc<dyn DirectoryLookup>) -> Self {
        Self {
            directory: Some(directory),
            ..Self::new()
        }
    }

    /// Open a remote session on the catalog named by `url`
    pub async fn connect(
        &self,
        url: &str,
        props: &ConnectProperties,
    ) -> Result<RemoteConnection, AgentError> {
        let url = ConnectionUrl::parse(url)?;
        let addr = self.resolve_address(&url, props).await?;
        let transport = self.link(&addr).await?;

        let request = Request::new(
            None,
            ClassType::Connection,
            ops::CONNECT,
            vec![
                Value::String(url.catalog.clone()),
                Value::from(props.user.clone()),
                Value::from(props.password.clone()),
                Value::Long(props.idle_timeout_ms()),
            ],
        );
        let response = transport.call(request, props.call_timeout).await?;
        let key = expect_key(unpack(response)?, ops::CONNECT)?;

        tracing::debug!("Opened session {} on catalog '{}' via {}", key, url.catalog, addr);

        let object = RemoteObject {
            key,
            class_type: ClassType::Connection,
            link: Link {
                transport,
                call_timeout: props.call_timeout,
            },
        };
        Ok(RemoteConnection::new(object, url.catalog, props.fetch_size))
    }

    /// Number of live links this driver holds
    pub fn open_links(&self) -> usize {
        self.links.iter().filter(|link| !link.is_closed()).count()
    }

    /// Server address for `url`; consults the directory only for directory-style URLs
    pub async fn resolve_address(
        &self,
        url: &ConnectionUrl,
        props: &ConnectProperties,
    ) -> Result<String, AgentError> {
        match &url.address {
            ServerAddress::Direct(addr) => Ok(addr.clone()),
            ServerAddress::Directory(servers) => {
                let directory = self.directory.as_deref().ok_or_else(|| {
                    AgentError::DirectoryLookup("no directory lookup configured".to_string())
                })?;
                discovery::resolve_with_timeout(
                    directory,
                    &url.catalog,
                    servers,
                    props.lookup_timeout,
                )
                .await
            }
        }
    }

    async fn link(&self, addr: &str) -> Result<Arc<Transport>, AgentError> {
        if let Some(link) = self.links.get(addr) {
            if !link.is_closed() {
                return Ok(link.clone());
            }
        }

        let _guard = self.link_lock.lock().await;
        if let Some(link) = self.links.get(addr) {
            if !link.is_closed() {
                return Ok(link.clone());
            }
        }

        let link = Transport::connect(addr).await?;
        self.links.insert(addr.to_string(), link.clone());
        Ok(link)
    }
}

#[derive(Clone)]
pub(crate) struct Link {
    transport: Arc<Transport>,
    call_timeout: Duration,
}

/// Key plus link: the addressing part every proxy shares
#[derive(Clone)]
pub(crate) struct RemoteObject {
    key: ObjectKey,
    class_type: ClassType,
    link: Link,
}

impl RemoteObject {
    pub(crate) fn key(&self) -> ObjectKey {
        self.key
    }

    pub(crate) async fn invoke(&self, operation: &str, arguments: Vec<Value>) -> Result<Value, AgentError> {
        let request = Request::new(Some(self.key), self.class_type, operation, arguments);
        let response = self
            .link
            .transport
            .call(request, self.link.call_timeout)
            .await?;
        unpack(response)
    }

    /// Proxy addressing for a child the server just registered
    pub(crate) fn child(&self, class_type: ClassType, key: ObjectKey) -> RemoteObject {
        RemoteObject {
            key,
            class_type,
            link: self.link.clone(),
        }
    }
}

pub(crate) fn unpack(response: Response) -> Result<Value, AgentError> {
    match response.outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::Failure(desc) => Err(desc.into()),
    }
}

fn unexpected(operation: &str, expected: &str, got: &Value) -> AgentError {
    AgentError::MalformedMessage(format!(
        "{} returned {}, expected {}",
        operation,
        got.type_name(),
        expected
    ))
}

pub(crate) fn expect_key(value: Value, operation: &str) -> Result<ObjectKey, AgentError> {
    value.as_key().ok_or_else(|| unexpected(operation, "object key", &value))
}

pub(crate) fn expect_bool(value: Value, operation: &str) -> Result<bool, AgentError> {
    value.as_bool().ok_or_else(|| unexpected(operation, "boolean", &value))
}

pub(crate) fn expect_i64(value: Value, operation: &str) -> Result<i64, AgentError> {
    value.as_i64().ok_or_else(|| unexpected(operation, "integer", &value))
}

pub(crate) fn expect_string(value: Value, operation: &str) -> Result<String, AgentError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(unexpected(operation, "string", &other)),
    }
}
