//! WebSocket byte-stream adapter.
//!
//! Presents a [`WebSocketStream`] as an `AsyncRead + AsyncWrite` duplex so a
//! session can run over it. Every write becomes one binary message; reads
//! yield the payloads of binary and text messages in arrival order. Ping and
//! pong frames are handled by tungstenite and never surface.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

// ============================================================================
// WsStream
// ============================================================================

/// A WebSocket connection used as a byte stream.
#[derive(Debug)]
pub struct WsStream<T> {
    /// Underlying WebSocket.
    inner: WebSocketStream<T>,
    /// Unread remainder of the last message.
    pending: Bytes,
    /// A close frame or end of stream was seen.
    eof: bool,
}

impl<T> WsStream<T> {
    /// Wraps an established WebSocket.
    #[must_use]
    pub fn new(inner: WebSocketStream<T>) -> Self {
        Self {
            inner,
            pending: Bytes::new(),
            eof: false,
        }
    }

    /// Returns the underlying WebSocket.
    #[inline]
    #[must_use]
    pub fn get_ref(&self) -> &WebSocketStream<T> {
        &self.inner
    }

    /// Unwraps the WebSocket, discarding unread data.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> WebSocketStream<T> {
        self.inner
    }
}

impl<T> AsyncRead for WsStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => this.pending = data,
                Some(Ok(Message::Text(text))) => {
                    this.pending = Bytes::copy_from_slice(text.as_bytes());
                }
                Some(Ok(Message::Close(frame))) => {
                    trace!(?frame, "WebSocket close received");
                    this.eof = true;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
                None => this.eof = true,
            }
        }
    }
}

impl<T> AsyncWrite for WsStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(Pin::new(&mut this.inner).poll_ready(cx)).map_err(io::Error::other)?;
        Pin::new(&mut this.inner)
            .start_send(Message::Binary(Bytes::copy_from_slice(buf)))
            .map_err(io::Error::other)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_flush(cx)
            .map_err(io::Error::other)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_close(cx)
            .map_err(io::Error::other)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    #[tokio::test]
    async fn test_writes_become_binary_messages() {
        let (client, mut server) = pair().await;
        let mut stream = WsStream::new(client);

        stream.write_all(b"12#hello").await.expect("write");
        stream.flush().await.expect("flush");

        match server.next().await {
            Some(Ok(Message::Binary(data))) => assert_eq!(&data[..], b"12#hello"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reads_span_messages() {
        let (client, mut server) = pair().await;
        let mut stream = WsStream::new(client);

        server
            .send(Message::Binary(Bytes::from_static(b"abc")))
            .await
            .expect("send");
        server.send(Message::Text("def".into())).await.expect("send");

        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).await.expect("read");
        assert_eq!(&buf, b"abcdef");
    }

    #[tokio::test]
    async fn test_close_reads_as_eof() {
        let (client, mut server) = pair().await;
        let mut stream = WsStream::new(client);

        server.close(None).await.expect("close");

        let mut buf = Vec::new();
        let n = stream.read_to_end(&mut buf).await.expect("read");
        assert_eq!(n, 0);
    }
}
