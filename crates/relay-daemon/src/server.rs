//! TCP acceptor for relay clients.
//!
//! Accepts connections in a loop and hands each one to its own task, so a
//! slow or idle client never delays the next accept. Shutdown stops the
//! listener, gives open connections a grace period, then force-closes the
//! rest.

use crate::connection::{ConnectionHandler, PeerStream};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Where the relay gets incoming connections from.
#[async_trait]
pub trait ConnectionSource: Send {
    type Stream: PeerStream + 'static;

    /// Wait for the next incoming connection.
    async fn accept(&mut self) -> std::io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl ConnectionSource for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> std::io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Listening relay server.
pub struct RelayServer<L = TcpListener> {
    listener: L,
    /// How long shutdown waits before force-closing connections
    shutdown_grace: Duration,
}

impl RelayServer<TcpListener> {
    /// Bind the listener.
    pub async fn bind(listen_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        info!("TCP server listening on {}", listen_addr);

        Ok(Self::from_source(listener))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

impl<L: ConnectionSource> RelayServer<L> {
    /// Serve connections from an already-open source.
    pub fn from_source(listener: L) -> Self {
        Self {
            listener,
            shutdown_grace: Duration::from_secs(10),
        }
    }

    /// Set how long shutdown waits for open connections.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Accept until `shutdown` is cancelled, then drain open connections.
    pub async fn run(self, handler: ConnectionHandler, shutdown: CancellationToken) {
        let RelayServer {
            mut listener,
            shutdown_grace,
        } = self;
        let tasks = TaskTracker::new();
        let force_close = CancellationToken::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            spawn_connection(&tasks, &handler, &force_close, stream, addr)
                        }
                        Err(e) => error!("Error accepting connection: {}", e),
                    }
                }
            }
        }

        drop(listener);
        tasks.close();

        if tasks.is_empty() {
            return;
        }

        info!(
            "Waiting up to {:?} for {} open connection(s)",
            shutdown_grace,
            tasks.len()
        );
        if tokio::time::timeout(shutdown_grace, tasks.wait()).await.is_err() {
            warn!(
                "Closing {} connection(s) still open after grace period",
                tasks.len()
            );
            force_close.cancel();
            tasks.wait().await;
        }
        info!("All connections closed");
    }
}

fn spawn_connection<S: PeerStream + 'static>(
    tasks: &TaskTracker,
    handler: &ConnectionHandler,
    force_close: &CancellationToken,
    stream: S,
    addr: SocketAddr,
) {
    let handler = handler.clone();
    let force_close = force_close.clone();

    tasks.spawn(async move {
        match handler.handle(stream, force_close).await {
            Ok(departure) => debug!("Connection from {} ended: {:?}", addr, departure),
            Err(e) if e.is_transport() => {
                debug!("Connection from {} ended: {}", addr, e)
            }
            Err(e) => warn!("Connection from {} failed: {}", addr, e),
        }
    });
}
