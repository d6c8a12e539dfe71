//! One-shot sockets for watches and streams.
//!
//! A side channel is a fresh TCP listener on an ephemeral port. Its address
//! goes back to the caller as the result of the setup call; the first peer to
//! connect gets the watch feed or byte pipe, and the listener is dropped.
//!
//! Setup calls run on blocking threads, so binding is synchronous and the
//! serving task is spawned through a stored runtime [`Handle`].

use fsremote_kernel::{HostFs, HostWatcher, ReadSource, WriteSink};
use fsremote_types::{CLOSE_FRAME, WatchFrame};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Allocates side-channel listeners.
#[derive(Debug, Clone)]
pub struct SideChannels {
    host: String,
    accept_timeout: Duration,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl SideChannels {
    pub fn new(
        host: impl Into<String>,
        accept_timeout: Duration,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            host: host.into(),
            accept_timeout,
            runtime,
            shutdown,
        }
    }

    /// Bind a listener, hand its first connection to `serve`, and return the
    /// `host:port` address.
    ///
    /// `serve` is dropped unrun if nobody connects within the accept timeout
    /// or the server shuts down first.
    pub fn open<F, Fut>(&self, label: &'static str, serve: F) -> io::Result<String>
    where
        F: FnOnce(TcpStream, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = std::net::TcpListener::bind((self.host.as_str(), 0))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let timeout = self.accept_timeout;
        let shutdown = self.shutdown.clone();

        self.runtime.spawn(async move {
            let listener = match TcpListener::from_std(listener) {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(kind = label, error = %e, "side channel listener failed");
                    return;
                }
            };
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(kind = label, %addr, "side channel cancelled before connect");
                    return;
                }
                accepted = tokio::time::timeout(timeout, listener.accept()) => accepted,
            };
            match accepted {
                Ok(Ok((stream, peer))) => {
                    drop(listener);
                    tracing::debug!(kind = label, %addr, %peer, "side channel connected");
                    serve(stream, shutdown).await;
                    tracing::debug!(kind = label, %addr, "side channel finished");
                }
                Ok(Err(e)) => {
                    tracing::warn!(kind = label, %addr, error = %e, "side channel accept failed");
                }
                Err(_) => {
                    tracing::warn!(
                        kind = label,
                        %addr,
                        timeout_secs = timeout.as_secs(),
                        "no peer connected to side channel, abandoning"
                    );
                }
            }
        });

        tracing::debug!(kind = label, %addr, "side channel listening");
        Ok(addr.to_string())
    }
}

/// Forward watch frames to the peer until either side closes.
///
/// The peer may send the `close` control line at any time; the watcher is
/// dropped when this returns, which stops the host feed.
pub async fn serve_watch(
    stream: TcpStream,
    watcher: HostWatcher,
    mut frames: mpsc::UnboundedReceiver<WatchFrame>,
    shutdown: CancellationToken,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!(path = %watcher.root().display(), "host watcher ended");
                    break;
                };
                let mut line = match frame.encode() {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unencodable watch frame");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::debug!(error = %e, "watch peer went away");
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == CLOSE_FRAME => {
                    tracing::debug!(path = %watcher.root().display(), "watch close requested");
                    break;
                }
                Ok(Some(other)) => {
                    tracing::debug!(line = %other, "ignoring unexpected watch control line");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "watch socket read failed");
                    break;
                }
            },
        }
    }

    drop(watcher);
    let _ = writer.shutdown().await;
}

/// Pipe a host file range to the peer.
pub async fn serve_read(
    mut stream: TcpStream,
    source: ReadSource,
    host: Arc<HostFs>,
    shutdown: CancellationToken,
) {
    let release = source.release_fd();
    tokio::select! {
        _ = shutdown.cancelled() => {}
        sent = source.pump(&mut stream) => match sent {
            Ok(bytes) => tracing::debug!(bytes, "read stream complete"),
            Err(e) => tracing::warn!(error = %e, "read stream failed"),
        },
    }
    if let Some(fd) = release {
        let _ = host.fds().remove(fd);
    }
}

/// Copy the peer's bytes into a host file until EOF.
pub async fn serve_write(
    mut stream: TcpStream,
    sink: WriteSink,
    host: Arc<HostFs>,
    shutdown: CancellationToken,
) {
    let release = sink.release_fd();
    tokio::select! {
        _ = shutdown.cancelled() => {}
        copied = sink.pump(&mut stream) => match copied {
            Ok(bytes) => tracing::debug!(bytes, "write stream complete"),
            Err(e) => tracing::warn!(error = %e, "write stream failed"),
        },
    }
    if let Some(fd) = release {
        let _ = host.fds().remove(fd);
    }
}
