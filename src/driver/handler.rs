//! Link handler for the remote-object protocol
//!
//! One handler per TCP link. Requests are read in a loop and each is
//! dispatched on its own task, so a slow call never holds up the link;
//! responses go back through a single writer task in completion order.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::dispatcher::Dispatcher;
use super::{
    decode_message, encode_response, AgentError, ClassType, ErrorDescriptor, ErrorKind, Outcome,
    Request, Response, DRIVER_MAGIC, MAX_MESSAGE_SIZE,
};
use crate::server::context::AgentContext;

/// Encoded response frames waiting for the writer
const WRITE_QUEUE_DEPTH: usize = 256;

pub struct LinkHandler {
    dispatcher: Dispatcher,
}

impl LinkHandler {
    pub fn new(context: Arc<AgentContext>) -> Self {
        Self {
            dispatcher: Dispatcher::new(context),
        }
    }

    /// Serve one link until the peer disconnects or sends something undecodable.
    /// Sessions opened over the link outlive it; the reaper collects them.
    pub async fn handle_connection(self, stream: TcpStream, addr: String) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }
        let (reader, writer) = stream.into_split();
        self.serve(reader, writer, &addr).await;
    }

    pub(crate) async fn serve<R, W>(self, mut reader: R, writer: W, addr: &str)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut magic = vec![0u8; DRIVER_MAGIC.len()];
        if let Err(e) = reader.read_exact(&mut magic).await {
            tracing::debug!("Link from {} closed before handshake: {}", addr, e);
            return;
        }
        if magic != DRIVER_MAGIC {
            tracing::warn!("Rejected link from {}: bad protocol header", addr);
            return;
        }
        tracing::info!("Driver link from {}", addr);

        let (tx, rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_DEPTH);
        let writer_task = tokio::spawn(write_frames(writer, rx, addr.to_string()));

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Driver link closed: {}", addr);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Driver read error from {}: {}", addr, e);
                    break;
                }
            }

            let msg_len = u32::from_be_bytes(len_buf) as usize;
            if msg_len > MAX_MESSAGE_SIZE {
                tracing::warn!("Frame of {} bytes from {} exceeds the limit", msg_len, addr);
                reject(&tx, AgentError::MessageTooLarge.to_string()).await;
                break;
            }

            let mut payload = vec![0u8; msg_len];
            if let Err(e) = reader.read_exact(&mut payload).await {
                tracing::warn!("Driver read payload error from {}: {}", addr, e);
                break;
            }

            let request: Request = match decode_message(&payload) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Malformed request from {}: {}", addr, e);
                    reject(&tx, e.to_string()).await;
                    break;
                }
            };

            let dispatcher = self.dispatcher.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = dispatcher.handle(request).await;
                let frame = match encode_response(&response) {
                    Ok(frame) => frame,
                    Err(e) => match encode_response(&oversize_failure(response, e)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!("Could not encode failure response: {}", e);
                            return;
                        }
                    },
                };
                // A closed channel means the link is gone; the response has nowhere to go
                let _ = tx.send(frame).await;
            });
        }

        drop(tx);
        if let Err(e) = writer_task.await {
            tracing::error!("Writer task for {} failed: {}", addr, e);
        }
        tracing::info!("Driver link from {} ended", addr);
    }
}

async fn write_frames<W>(mut writer: W, mut rx: mpsc::Receiver<Vec<u8>>, addr: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            tracing::warn!("Failed to send response to {}: {}", addr, e);
            return;
        }
        if rx.is_empty() {
            if let Err(e) = writer.flush().await {
                tracing::warn!("Failed to flush responses to {}: {}", addr, e);
                return;
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// The request could not be read, so there is nothing to echo
async fn reject(tx: &mpsc::Sender<Vec<u8>>, message: String) {
    let response = Response {
        correlation_id: 0,
        target_key: None,
        class_type: ClassType::Connection,
        operation: String::new(),
        outcome: Outcome::Failure(ErrorDescriptor::new(ErrorKind::MalformedMessage, message)),
    };
    match encode_response(&response) {
        Ok(frame) => {
            let _ = tx.send(frame).await;
        }
        Err(e) => tracing::error!("Could not encode rejection: {}", e),
    }
}

fn oversize_failure(mut response: Response, err: AgentError) -> Response {
    tracing::warn!(
        "Response to {} on {:?} could not be sent: {}",
        response.operation,
        response.target_key,
        err
    );
    response.outcome = Outcome::Failure(ErrorDescriptor::new(
        ErrorKind::OperationFailure,
        format!("Response could not be sent: {}", err),
    ));
    response
}

/// Spawn the link acceptor task; returns a channel to hand it accepted streams
pub fn spawn_link_handler(context: Arc<AgentContext>) -> mpsc::Sender<(TcpStream, String)> {
    let (tx, mut rx) = mpsc::channel::<(TcpStream, String)>(100);

    tokio::spawn(async move {
        while let Some((stream, addr)) = rx.recv().await {
            let handler = LinkHandler::new(context.clone());
            tokio::spawn(handler.handle_connection(stream, addr));
        }
    });

    tx
}
