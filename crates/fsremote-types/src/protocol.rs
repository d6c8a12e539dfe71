//! Request/response channel contract.
//!
//! The main channel carries one JSON object per line. A request names the
//! operation and carries its serialized argument envelope; the response
//! carries either the serialized result or a [`RemoteError`].
//!
//! [`RpcChannel`] is the seam between the invocation adapter and whatever
//! actually moves those objects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MarshalError;
use thiserror::Error;
use uuid::Uuid;

/// A call on the main channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    /// Registry name of the operation.
    pub method: String,
    /// Argument envelope.
    #[serde(default)]
    pub args: serde_json::Value,
}

impl Request {
    pub fn new(method: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            args,
        }
    }
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    pub fn success(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: RemoteError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_result(self) -> Result<serde_json::Value, RemoteError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Category of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Arguments failed validation after deserialization.
    TypeMismatch,
    /// The request could not be decoded.
    Protocol,
    /// No such operation in the remote registry.
    UnknownMethod,
    /// The host operation failed.
    Host,
    Internal,
}

/// A failure reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    /// Host error code such as `ENOENT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syscall: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            errno: None,
            syscall: None,
            path: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Protocol, message)
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(RemoteErrorKind::UnknownMethod, format!("Unknown method: {method}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Internal, message)
    }

    /// Whether this carries the host error code `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

/// Argument validation failures are type mismatches; everything else the
/// executor could not decode is a protocol failure.
impl From<MarshalError> for RemoteError {
    fn from(err: MarshalError) -> Self {
        let kind = if err.is_type_mismatch() {
            RemoteErrorKind::TypeMismatch
        } else {
            RemoteErrorKind::Protocol
        };
        Self::new(kind, err.to_string())
    }
}

/// Failure of a call on the main channel.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

/// The request/response channel to the remote side.
///
/// `call` suspends until the reply arrives; `call_sync` blocks the calling
/// thread and must not be used from inside an async task that the reply
/// depends on.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    async fn call(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value, RpcError>;

    fn call_sync(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value, RpcError>;
}
