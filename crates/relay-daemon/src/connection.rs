//! Per-connection lifecycle.
//!
//! A handler owns one accepted stream end to end: it registers the peer,
//! sends the peer list, then waits on line-delimited input until the client
//! says `exit`, disconnects, or the relay shuts down. Deregistration always
//! runs once registration succeeded.

use crate::error::{RelayError, Result};
use futures::{FutureExt, StreamExt};
use relay_core::{Member, MembershipStore, encode_peer_list, filter_peers};
use std::fmt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest input line accepted from a client.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Line that ends a session, compared ignoring ASCII case.
pub const EXIT_COMMAND: &str = "exit";

/// A client stream the handler can serve.
pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// Transport-level address of the remote end.
    fn remote_endpoint(&self) -> std::io::Result<SocketAddr>;
}

impl PeerStream for TcpStream {
    fn remote_endpoint(&self) -> std::io::Result<SocketAddr> {
        self.peer_addr()
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Registered,
    PeerListSent,
    AwaitingInput,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Registered => "registered",
            ConnectionState::PeerListSent => "peer-list-sent",
            ConnectionState::AwaitingInput => "awaiting-input",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why the input-wait phase ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Client sent the exit command
    ExitCommand,
    /// Client closed its end of the stream
    EndOfStream,
    /// Relay is shutting down
    Shutdown,
}

/// Deadlines applied to client I/O.
#[derive(Debug, Clone, Copy)]
pub struct HandlerConfig {
    /// Deadline for each line read
    pub read_timeout: Duration,
    /// Deadline for the peer-list write
    pub write_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(300),
        }
    }
}

/// Serves connections against a shared membership store.
///
/// Cheap to clone; every clone shares the same store handle.
#[derive(Clone)]
pub struct ConnectionHandler {
    store: Arc<dyn MembershipStore>,
    config: HandlerConfig,
}

impl ConnectionHandler {
    pub fn new(store: Arc<dyn MembershipStore>, config: HandlerConfig) -> Self {
        Self { store, config }
    }

    /// Run one connection to completion.
    ///
    /// `force_close` ends the input wait early; the member is still
    /// deregistered.
    pub async fn handle<S: PeerStream>(
        &self,
        stream: S,
        force_close: CancellationToken,
    ) -> Result<Departure> {
        let endpoint = stream
            .remote_endpoint()
            .map_err(|e| RelayError::MalformedAddress(e.to_string()))?;
        let member = Member::from_socket_addr(endpoint);
        info!("New connection from {} ({})", member, endpoint);
        debug!("{}: {}", member, ConnectionState::Accepted);

        self.store.add_member(&member).await?;
        debug!("{}: {}", member, ConnectionState::Registered);

        // The stream is consumed by the session, so it is closed before the
        // member is removed.
        let session = AssertUnwindSafe(self.session(stream, &member, force_close)).catch_unwind();
        let result = match session.await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Transport(std::io::Error::other(
                "connection handler panicked",
            ))),
        };

        if let Err(e) = self.store.remove_member(&member).await {
            warn!("Failed to remove {} from membership set: {}", member, e);
        }
        debug!("{}: {}", member, ConnectionState::Closed);
        info!("Connection closed: {}", member);

        result
    }

    /// Everything between registration and close.
    async fn session<S: PeerStream>(
        &self,
        mut stream: S,
        member: &Member,
        force_close: CancellationToken,
    ) -> Result<Departure> {
        let members = self.store.list_members().await?;
        let peers = filter_peers(members, member);
        let payload = encode_peer_list(&peers)?;

        self.with_deadline("write", self.config.write_timeout, async {
            stream.write_all(&payload).await?;
            stream.flush().await
        })
        .await?;
        debug!(
            "{}: {} ({} peer(s))",
            member,
            ConnectionState::PeerListSent,
            peers.len()
        );

        debug!("{}: {}", member, ConnectionState::AwaitingInput);
        // Raw byte lines: input that is not UTF-8 is ignored like any other line
        let codec = AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            MAX_LINE_LENGTH,
        );
        let mut lines = FramedRead::new(stream, codec);
        loop {
            let next = tokio::select! {
                _ = force_close.cancelled() => return Ok(Departure::Shutdown),
                next = tokio::time::timeout(self.config.read_timeout, lines.next()) => next,
            };

            let line = match next {
                Err(_) => {
                    return Err(RelayError::Timeout {
                        operation: "read",
                        after: self.config.read_timeout,
                    });
                }
                Ok(None) => return Ok(Departure::EndOfStream),
                Ok(Some(Err(e))) => {
                    return Err(RelayError::Transport(std::io::Error::other(e)));
                }
                Ok(Some(Ok(line))) => line,
            };

            let line = line.strip_suffix(b"\r").unwrap_or(&line);
            if line.eq_ignore_ascii_case(EXIT_COMMAND.as_bytes()) {
                return Ok(Departure::ExitCommand);
            }
            debug!("{}: ignoring {} byte line", member, line.len());
        }
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        after: Duration,
        io: impl Future<Output = std::io::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(after, io).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RelayError::Timeout { operation, after }),
        }
    }
}
