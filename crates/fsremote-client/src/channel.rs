//! TCP transport for the main channel.
//!
//! Every call opens its own connection, writes one request line and reads
//! one response line. Calls are independent, so nothing orders them and no
//! connection state outlives a call.

use async_trait::async_trait;
use fsremote_types::{Request, Response, RpcChannel, RpcError};
use serde_json::Value as Json;
use std::io::{BufRead, BufReader as StdBufReader, Write};
use std::net::{TcpStream as StdTcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::constants::{DEFAULT_CALL_TIMEOUT, DEFAULT_SERVER_ADDR};

/// Where the server lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub addr: String,
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_SERVER_ADDR.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// [`RpcChannel`] over newline-delimited JSON on TCP.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    config: ClientConfig,
}

impl TcpChannel {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, RpcError> {
        let stream = TcpStream::connect(&self.config.addr).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(encode(request)?.as_bytes()).await?;
        writer.flush().await?;

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await?;
        decode(request, &line)
    }

    fn round_trip_sync(&self, request: &Request) -> Result<Response, RpcError> {
        let addr = self
            .config
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RpcError::Transport(format!("{} resolved to nothing", self.config.addr)))?;
        let mut stream = StdTcpStream::connect_timeout(&addr, self.config.call_timeout)?;
        stream.set_read_timeout(Some(self.config.call_timeout))?;
        stream.write_all(encode(request)?.as_bytes())?;
        stream.flush()?;

        let mut line = String::new();
        StdBufReader::new(stream).read_line(&mut line)?;
        decode(request, &line)
    }
}

fn encode(request: &Request) -> Result<String, RpcError> {
    let mut text = serde_json::to_string(request).map_err(|e| RpcError::Protocol(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

fn decode(request: &Request, line: &str) -> Result<Response, RpcError> {
    if line.is_empty() {
        return Err(RpcError::Transport("connection closed before a response arrived".into()));
    }
    let response: Response =
        serde_json::from_str(line.trim_end()).map_err(|e| RpcError::Protocol(format!("invalid response: {e}")))?;
    // An empty id is the server rejecting a request it could not parse.
    if response.id != request.id && !response.id.is_empty() {
        return Err(RpcError::Protocol(format!(
            "response id {} does not match request {}",
            response.id, request.id
        )));
    }
    Ok(response)
}

#[async_trait]
impl RpcChannel for TcpChannel {
    async fn call(&self, method: &str, args: Json) -> Result<Json, RpcError> {
        let request = Request::new(method, args);
        tracing::trace!(method, id = %request.id, "sending request");
        let response = tokio::time::timeout(self.config.call_timeout, self.round_trip(&request))
            .await
            .map_err(|_| RpcError::Transport(format!("{method} timed out after {:?}", self.config.call_timeout)))??;
        Ok(response.into_result()?)
    }

    fn call_sync(&self, method: &str, args: Json) -> Result<Json, RpcError> {
        let request = Request::new(method, args);
        tracing::trace!(method, id = %request.id, "sending blocking request");
        Ok(self.round_trip_sync(&request)?.into_result()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsremote_types::{RemoteError, RemoteErrorKind};
    use serde_json::json;
    use tokio::net::TcpListener;

    /// One-shot server that answers the first request with `reply(request)`.
    async fn answer_once(reply: impl FnOnce(Request) -> String + Send + 'static) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            let request: Request = serde_json::from_str(&line).unwrap();
            let mut out = reply(request);
            out.push('\n');
            writer.write_all(out.as_bytes()).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.addr, "127.0.0.1:7878");
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        let config = ClientConfig::new("10.0.0.1:9").with_call_timeout(Duration::from_secs(2));
        assert_eq!(config.addr, "10.0.0.1:9");
        assert_eq!(config.call_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let addr = answer_once(|req| {
            assert_eq!(req.method, "existsSync");
            serde_json::to_string(&Response::success(req.id, json!({"type": "boolean", "value": true}))).unwrap()
        })
        .await;
        let channel = TcpChannel::new(ClientConfig::new(addr));
        let result = channel.call("existsSync", json!({"type": "[string]", "value": []})).await.unwrap();
        assert_eq!(result, json!({"type": "boolean", "value": true}));
    }

    #[tokio::test]
    async fn test_call_surfaces_remote_error() {
        let addr = answer_once(|req| {
            let mut err = RemoteError::new(RemoteErrorKind::Host, "ENOENT: no such file or directory, unlink '/x'");
            err.code = Some("ENOENT".into());
            serde_json::to_string(&Response::failure(req.id, err)).unwrap()
        })
        .await;
        let channel = TcpChannel::new(ClientConfig::new(addr));
        let err = channel.call("unlink", json!(null)).await.unwrap_err();
        match err {
            RpcError::Remote(e) => assert!(e.has_code("ENOENT")),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_id_is_protocol_error() {
        let addr = answer_once(|_| {
            serde_json::to_string(&Response::success("someone-else", json!(null))).unwrap()
        })
        .await;
        let channel = TcpChannel::new(ClientConfig::new(addr));
        let err = channel.call("close", json!(null)).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)), "got {err:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_call_sync_round_trip() {
        let addr = answer_once(|req| {
            serde_json::to_string(&Response::success(req.id, json!({"type": "integer", "value": 3}))).unwrap()
        })
        .await;
        let channel = TcpChannel::new(ClientConfig::new(addr));
        let result = tokio::task::spawn_blocking(move || channel.call_sync("openSync", json!(null)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, json!({"type": "integer", "value": 3}));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let channel = TcpChannel::new(ClientConfig::new(addr));
        let err = channel.call("close", json!(null)).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)), "got {err:?}");
    }
}
