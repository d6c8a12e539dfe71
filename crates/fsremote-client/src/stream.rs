//! Byte streams over stream side channels.
//!
//! Both ends connect on first poll, so creating a stream never blocks and a
//! stream that is never polled never connects.

use futures::future::BoxFuture;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

struct LazySocket {
    addr: String,
    connecting: Option<BoxFuture<'static, io::Result<TcpStream>>>,
    stream: Option<TcpStream>,
}

impl LazySocket {
    fn new(addr: String) -> Self {
        Self {
            addr,
            connecting: None,
            stream: None,
        }
    }

    fn poll_stream(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<Pin<&mut TcpStream>>> {
        if self.stream.is_none() {
            let addr = self.addr.clone();
            let connecting = self
                .connecting
                .get_or_insert_with(|| Box::pin(TcpStream::connect(addr)));
            let stream = ready!(connecting.as_mut().poll(cx))?;
            tracing::trace!(addr = %self.addr, "stream side channel connected");
            self.connecting = None;
            self.stream = Some(stream);
        }
        match self.stream.as_mut() {
            Some(stream) => Poll::Ready(Ok(Pin::new(stream))),
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotConnected, "stream not connected"))),
        }
    }
}

/// Bytes of a remote file, as produced by `createReadStream`.
///
/// Reaches EOF once the remote side has sent the requested range.
pub struct ReadStream {
    socket: LazySocket,
}

impl ReadStream {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            socket: LazySocket::new(addr.into()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.socket.addr
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream").field("addr", &self.socket.addr).finish()
    }
}

impl AsyncRead for ReadStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let stream = ready!(self.socket.poll_stream(cx))?;
        stream.poll_read(cx, buf)
    }
}

/// Sink into a remote file, as produced by `createWriteStream`.
///
/// The remote file is complete once this stream has been shut down.
pub struct WriteStream {
    socket: LazySocket,
}

impl WriteStream {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            socket: LazySocket::new(addr.into()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.socket.addr
    }
}

impl std::fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStream").field("addr", &self.socket.addr).finish()
    }
}

impl AsyncWrite for WriteStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let stream = ready!(self.socket.poll_stream(cx))?;
        stream.poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let stream = ready!(self.socket.poll_stream(cx))?;
        stream.poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let stream = ready!(self.socket.poll_stream(cx))?;
        stream.poll_shutdown(cx)
    }
}
