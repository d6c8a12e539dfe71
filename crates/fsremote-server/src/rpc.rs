//! The main request/response channel.
//!
//! Newline-delimited JSON over TCP: one [`Request`] per line in, one
//! [`Response`] per line out, in order. Each connection runs as its own task
//! and each request runs on the blocking pool.

use fsremote_types::{Registry, RemoteError, Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};

/// A bound server, ready to run.
pub struct RpcServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl RpcServer {
    /// Bind the main channel. Must be called inside a tokio runtime.
    pub async fn bind(config: &ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(&config.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind.clone(),
                source,
            })?;
        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            config,
            Arc::new(Registry::standard()),
            Handle::current(),
            shutdown.clone(),
        ));
        Ok(Self {
            listener,
            dispatcher,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Cancelling this stops the accept loop and every pending side channel.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Accept connections until shut down.
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "fs-remote listening");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "connection accepted");
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let shutdown = self.shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, dispatcher, shutdown).await {
                                tracing::warn!(%peer, error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "accept error"),
                },
            }
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => run_request(&dispatcher, request).await,
            Err(e) => Response::failure("", RemoteError::protocol(format!("invalid request: {e}"))),
        };

        let mut json = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
    }
    Ok(())
}

async fn run_request(dispatcher: &Arc<Dispatcher>, request: Request) -> Response {
    let id = request.id.clone();
    let dispatcher = Arc::clone(dispatcher);
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(&request)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "dispatch task failed");
            Response::failure(id, RemoteError::internal(format!("dispatch failed: {e}")))
        }
    }
}
