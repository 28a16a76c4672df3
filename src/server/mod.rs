//! Server runtime: accept loop, live-object registry and session reaper

pub mod context;
pub mod cursor;
pub mod reaper;
pub mod registry;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use context::AgentContext;
pub use reaper::SessionReaper;
pub use registry::ObjectRegistry;

use crate::driver::spawn_link_handler;
use crate::error::ServerResult;

pub struct AgentServer {
    context: Arc<AgentContext>,
    listener: TcpListener,
}

impl AgentServer {
    pub async fn bind(context: Arc<AgentContext>, addr: &str) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { context, listener })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.context
    }

    /// Accept links until `shutdown` resolves, then close every live session
    pub async fn run_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let reaper = Arc::new(SessionReaper::new(
            self.context.registry.clone(),
            self.context.settings.reap_interval(),
        ));
        let reaper_handle = tokio::spawn(reaper.start());
        let links = spawn_link_handler(self.context.clone());

        tracing::info!("dbagent listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if links.send((stream, addr.to_string())).await.is_err() {
                            tracing::error!("Link acceptor task is gone");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Accept error: {}", e),
                },
            }
        }

        reaper_handle.abort();
        let closed = self.context.registry.close_all().await;
        tracing::info!("Shutdown complete, {} sessions closed", closed);
        Ok(())
    }
}
