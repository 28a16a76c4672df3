//! Multiplexed request/response link to one server
//!
//! Every request gets a correlation id. A single reader task owns the read half
//! of the socket and routes each response to the caller waiting on that id, so
//! any number of calls can be outstanding on one link at once.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::protocol::{
    decode_message, encode_request, AgentError, Request, Response, DRIVER_MAGIC, MAX_MESSAGE_SIZE,
};

type PendingCalls = DashMap<u64, oneshot::Sender<Response>>;

pub struct Transport {
    addr: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Transport {
    /// Open a link and start its response router
    pub async fn connect(addr: &str) -> Result<Arc<Self>, AgentError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            AgentError::ConnectionError(format!("Failed to connect to {}: {}", addr, e))
        })?;

        stream.set_nodelay(true).map_err(|e| {
            AgentError::ConnectionError(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let (read, mut write) = stream.into_split();

        write.write_all(DRIVER_MAGIC).await.map_err(|e| {
            AgentError::ConnectionError(format!("Failed to send magic header: {}", e))
        })?;
        write
            .flush()
            .await
            .map_err(|e| AgentError::ConnectionError(format!("Failed to flush: {}", e)))?;

        let pending: Arc<PendingCalls> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(route_responses(
            read,
            addr.to_string(),
            pending.clone(),
            closed.clone(),
        ));

        tracing::debug!("Opened link to {}", addr);

        Ok(Arc::new(Self {
            addr: addr.to_string(),
            writer: Mutex::new(write),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            reader,
        }))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of calls still waiting for a response
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Send `request` and wait up to `timeout` for its response.
    ///
    /// A timeout abandons only this call; the server may still complete it, and
    /// its late response is dropped by the router as unmatched.
    pub async fn call(&self, mut request: Request, timeout: Duration) -> Result<Response, AgentError> {
        if self.is_closed() {
            return Err(AgentError::ConnectionError(format!(
                "link to {} is closed",
                self.addr
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        request.correlation_id = id;
        let data = encode_request(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // The router may have shut down between the check above and the insert
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(AgentError::ConnectionError(format!(
                "link to {} is closed",
                self.addr
            )));
        }

        if let Err(e) = self.write_frame(&data).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AgentError::ConnectionError(format!(
                "link to {} closed while waiting for {}",
                self.addr, request.operation
            ))),
            Err(_) => {
                self.pending.remove(&id);
                tracing::debug!(
                    "Call {} ({}) on {} timed out after {:?}",
                    id,
                    request.operation,
                    self.addr,
                    timeout
                );
                Err(AgentError::TransportTimeout(timeout))
            }
        }
    }

    async fn write_frame(&self, data: &[u8]) -> Result<(), AgentError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(|e| AgentError::ConnectionError(format!("Write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| AgentError::ConnectionError(format!("Flush failed: {}", e)))
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn route_responses(
    mut read: OwnedReadHalf,
    addr: String,
    pending: Arc<PendingCalls>,
    closed: Arc<AtomicBool>,
) {
    loop {
        let mut len_buf = [0u8; 4];
        match read.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!("Link to {} closed by server", addr);
                break;
            }
            Err(e) => {
                tracing::warn!("Read error on link to {}: {}", addr, e);
                break;
            }
        }

        let msg_len = u32::from_be_bytes(len_buf) as usize;
        if msg_len > MAX_MESSAGE_SIZE {
            tracing::warn!("Oversized frame ({} bytes) from {}", msg_len, addr);
            break;
        }

        let mut payload = vec![0u8; msg_len];
        if let Err(e) = read.read_exact(&mut payload).await {
            tracing::warn!("Read payload error on link to {}: {}", addr, e);
            break;
        }

        let response: Response = match decode_message(&payload) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Undecodable response from {}: {}", addr, e);
                break;
            }
        };

        match pending.remove(&response.correlation_id) {
            Some((_, waiter)) => {
                // The caller may have given up in the meantime
                let _ = waiter.send(response);
            }
            None => {
                tracing::debug!(
                    "Discarding unmatched response {} ({}) from {}",
                    response.correlation_id,
                    response.operation,
                    addr
                );
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the senders fails every waiting call with a connection error
    pending.clear();
}
