//! Client errors.

use fsremote_types::{MarshalError, RemoteError, RpcError};
use thiserror::Error;

/// Failure of a call made through [`RemoteFs`](crate::RemoteFs).
#[derive(Debug, Error)]
pub enum FsError {
    /// Arguments or result failed their schema, or the wire desynced.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The remote side rejected the call or the host operation failed.
    #[error(transparent)]
    Remote(RemoteError),

    /// The main channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// A blocking call to a non-blocking operation, or the reverse.
    #[error("{method} is {}; call it with {}", if *.sync { "blocking" } else { "non-blocking" }, if *.sync { "call_sync" } else { "call" })]
    WrongConvention { method: String, sync: bool },

    /// Side channels need a tokio runtime to run on.
    #[error("{0} needs a tokio runtime")]
    NoRuntime(&'static str),
}

impl FsError {
    /// Host error code such as `ENOENT`, when the host reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            FsError::Remote(e) => e.code.as_deref(),
            _ => None,
        }
    }
}

impl From<RpcError> for FsError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(e) => FsError::Remote(e),
            RpcError::Transport(msg) => FsError::Transport(msg),
            RpcError::Protocol(msg) => FsError::Marshal(MarshalError::MalformedEnvelope(msg)),
        }
    }
}

/// Result type for client calls.
pub type FsResult<T> = Result<T, FsError>;
