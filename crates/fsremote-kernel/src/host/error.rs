//! Host operation errors.

use fsremote_types::{MarshalError, RemoteError, RemoteErrorKind};
use std::io;
use thiserror::Error;

/// Errors raised while executing an operation on the host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The operating system rejected the call.
    #[error("{message}")]
    Os {
        code: &'static str,
        errno: Option<i32>,
        syscall: &'static str,
        path: Option<String>,
        message: String,
    },

    /// No open file under this descriptor.
    #[error("EBADF: bad file descriptor, {syscall}")]
    BadDescriptor { fd: i64, syscall: &'static str },

    #[error("EINVAL: invalid argument, {0}")]
    InvalidArgument(String),

    #[error("ERR_UNKNOWN_ENCODING: unknown encoding: {0}")]
    UnknownEncoding(String),

    /// The host has no such call.
    #[error("ENOSYS: function not implemented, {0}")]
    Unsupported(&'static str),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("watch failed: {0}")]
    Watch(String),

    /// A value produced by the host failed its result schema.
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

fn describe(err: &io::Error) -> (&'static str, &'static str) {
    use io::ErrorKind::*;
    match err.kind() {
        NotFound => ("ENOENT", "no such file or directory"),
        PermissionDenied if err.raw_os_error() == Some(1) => ("EPERM", "operation not permitted"),
        PermissionDenied => ("EACCES", "permission denied"),
        AlreadyExists => ("EEXIST", "file already exists"),
        NotADirectory => ("ENOTDIR", "not a directory"),
        IsADirectory => ("EISDIR", "illegal operation on a directory"),
        DirectoryNotEmpty => ("ENOTEMPTY", "directory not empty"),
        InvalidInput => ("EINVAL", "invalid argument"),
        CrossesDevices => ("EXDEV", "cross-device link not permitted"),
        ReadOnlyFilesystem => ("EROFS", "read-only file system"),
        StorageFull => ("ENOSPC", "no space left on device"),
        ResourceBusy => ("EBUSY", "resource busy or locked"),
        TooManyLinks => ("EMLINK", "too many links"),
        InvalidFilename => ("ENAMETOOLONG", "name too long"),
        Unsupported => ("ENOSYS", "function not implemented"),
        _ => ("UNKNOWN", "unknown error"),
    }
}

impl HostError {
    /// Wrap an I/O error from `syscall` on `path`.
    pub fn io(err: io::Error, syscall: &'static str, path: Option<&str>) -> Self {
        let (code, description) = describe(&err);
        let message = match path {
            Some(p) => format!("{code}: {description}, {syscall} '{p}'"),
            None => format!("{code}: {description}, {syscall}"),
        };
        HostError::Os {
            code,
            errno: err.raw_os_error(),
            syscall,
            path: path.map(str::to_string),
            message,
        }
    }

    /// Wrap an I/O error from a two-path call such as `rename`.
    pub fn io2(err: io::Error, syscall: &'static str, from: &str, to: &str) -> Self {
        let (code, description) = describe(&err);
        HostError::Os {
            code,
            errno: err.raw_os_error(),
            syscall,
            path: Some(from.to_string()),
            message: format!("{code}: {description}, {syscall} '{from}' -> '{to}'"),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        HostError::InvalidArgument(message.into())
    }

    /// Node-style error code.
    pub fn code(&self) -> &'static str {
        match self {
            HostError::Os { code, .. } => code,
            HostError::BadDescriptor { .. } => "EBADF",
            HostError::InvalidArgument(_) => "EINVAL",
            HostError::UnknownEncoding(_) => "ERR_UNKNOWN_ENCODING",
            HostError::Unsupported(_) => "ENOSYS",
            HostError::UnknownOperation(_) => "ERR_UNKNOWN_OPERATION",
            HostError::Watch(_) => "EWATCH",
            HostError::Marshal(_) => "ERR_INVALID_RETURN_VALUE",
        }
    }

    /// Report this error across the channel.
    pub fn to_remote(&self) -> RemoteError {
        let mut remote = RemoteError::new(RemoteErrorKind::Host, self.to_string());
        remote.code = Some(self.code().to_string());
        match self {
            HostError::Os {
                errno,
                syscall,
                path,
                ..
            } => {
                remote.errno = *errno;
                remote.syscall = Some(syscall.to_string());
                remote.path = path.clone();
            }
            HostError::BadDescriptor { syscall, .. } => {
                remote.syscall = Some(syscall.to_string());
            }
            HostError::Unsupported(syscall) => {
                remote.syscall = Some(syscall.to_string());
            }
            HostError::UnknownOperation(_) => {
                remote.kind = RemoteErrorKind::UnknownMethod;
            }
            HostError::Marshal(_) => {
                remote.kind = RemoteErrorKind::Internal;
            }
            _ => {}
        }
        remote
    }
}

impl From<HostError> for RemoteError {
    fn from(err: HostError) -> Self {
        err.to_remote()
    }
}

impl From<HostError> for io::Error {
    fn from(err: HostError) -> Self {
        let kind = match &err {
            HostError::Os { code: "ENOENT", .. } => io::ErrorKind::NotFound,
            HostError::Os { code: "EEXIST", .. } => io::ErrorKind::AlreadyExists,
            HostError::Os {
                code: "EACCES" | "EPERM",
                ..
            } => io::ErrorKind::PermissionDenied,
            HostError::BadDescriptor { .. } | HostError::InvalidArgument(_) => {
                io::ErrorKind::InvalidInput
            }
            HostError::Unsupported(_) => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_matches_host_format() {
        let err = HostError::io(io::Error::from(io::ErrorKind::NotFound), "open", Some("/x"));
        assert_eq!(err.to_string(), "ENOENT: no such file or directory, open '/x'");
        assert_eq!(err.code(), "ENOENT");
    }

    #[test]
    fn test_two_path_message() {
        let err = HostError::io2(
            io::Error::from(io::ErrorKind::AlreadyExists),
            "link",
            "/a",
            "/b",
        );
        assert_eq!(err.to_string(), "EEXIST: file already exists, link '/a' -> '/b'");
    }

    #[test]
    fn test_to_remote_carries_details() {
        let err = HostError::io(io::Error::from_raw_os_error(2), "stat", Some("/nope"));
        let remote = err.to_remote();
        assert_eq!(remote.kind, RemoteErrorKind::Host);
        assert!(remote.has_code("ENOENT"));
        assert_eq!(remote.errno, Some(2));
        assert_eq!(remote.syscall.as_deref(), Some("stat"));
        assert_eq!(remote.path.as_deref(), Some("/nope"));
    }

    #[test]
    fn test_into_io_error() {
        let err: io::Error = HostError::BadDescriptor { fd: 9, syscall: "close" }.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
