//! In-process streams for driving handlers and the accept loop in tests.

use crate::connection::PeerStream;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Duplex stream with a fixed remote endpoint.
pub struct FakeStream {
    pub inner: DuplexStream,
    pub remote: Option<SocketAddr>,
}

impl FakeStream {
    /// Create a connected pair: the client half and the relay-side stream.
    pub fn pair(remote: &str, buffer: usize) -> (DuplexStream, FakeStream) {
        let (client, server) = tokio::io::duplex(buffer);
        let stream = FakeStream {
            inner: server,
            remote: Some(remote.parse().unwrap()),
        };
        (client, stream)
    }
}

impl AsyncRead for FakeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl PeerStream for FakeStream {
    fn remote_endpoint(&self) -> std::io::Result<SocketAddr> {
        self.remote.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "socket is not connected")
        })
    }
}
