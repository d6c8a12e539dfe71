//! Byte pipes between host files and side-channel sockets.
//!
//! Both ends open their file when the stream is requested, so a bad path or
//! descriptor fails the request itself rather than the socket.

use fsremote_types::Value;
use fsremote_types::constants::DEFAULT_FILE_MODE;
use std::fs::File;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::host::args::{self, arg};
use crate::host::{HostError, HostFs, HostResult, OpenFlags};

/// Default chunk size for read streams.
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Open `path` with the stream's flags, or duplicate its `fd`.
///
/// Returns the file and the descriptor to release once the stream ends.
fn open_file(
    host: &HostFs,
    args: &[Value],
    default_flags: &str,
    syscall: &'static str,
) -> HostResult<(File, Option<i64>)> {
    let options = arg(args, 1);
    if let Some(fd) = args::opt_int(options.field("fd")) {
        let file = host
            .fds()
            .get(fd, syscall)?
            .try_clone()
            .map_err(|e| HostError::io(e, syscall, None))?;
        let auto_close = args::option_bool(options, "autoClose").unwrap_or(true);
        return Ok((file, auto_close.then_some(fd)));
    }
    let path = args::path(arg(args, 0))?;
    let flags = OpenFlags::from_value(options.field("flags"), default_flags)?;
    let mode = args::mode(options.field("mode"), DEFAULT_FILE_MODE)?;
    let file = flags
        .open(&path, mode)
        .map_err(|e| HostError::io(e, "open", Some(&path.to_string_lossy())))?;
    Ok((file, None))
}

fn start_offset(options: &Value) -> HostResult<Option<u64>> {
    match args::checked_int(options.field("start"), "start")? {
        None => Ok(None),
        Some(start) => u64::try_from(start)
            .map(Some)
            .map_err(|_| HostError::invalid(format!("start must be >= 0, got {start}"))),
    }
}

/// Bytes covered by an inclusive `end`; `None` when the range is open.
///
/// An end too large for a file offset reads to end of file.
fn byte_limit(end: &Value, start: Option<u64>) -> HostResult<Option<u64>> {
    let end = match end {
        Value::Number(end) => *end,
        _ => return Ok(None),
    };
    if end.is_nan() || end < 0.0 {
        return Err(HostError::invalid(format!("end must be >= 0, got {end}")));
    }
    let first = start.unwrap_or(0) as f64;
    if end < first {
        return Err(HostError::invalid(format!("end ({end}) must be >= start ({first})")));
    }
    let span = (end - first).trunc();
    if span >= u64::MAX as f64 {
        return Ok(None);
    }
    Ok(Some((span as u64).saturating_add(1)))
}

/// The remote end of a read stream.
#[derive(Debug)]
pub struct ReadSource {
    file: File,
    start: Option<u64>,
    /// Bytes left to send; `None` reads to end of file.
    limit: Option<u64>,
    chunk: usize,
    release_fd: Option<i64>,
}

impl ReadSource {
    /// Open from `createReadStream` arguments.
    pub fn open(host: &HostFs, args: &[Value], default_chunk: usize) -> HostResult<Self> {
        let options = arg(args, 1);
        let start = start_offset(options)?;
        let limit = byte_limit(options.field("end"), start)?;
        let chunk = args::opt_int(options.field("highWaterMark"))
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(default_chunk);
        let (file, release_fd) = open_file(host, args, "r", "read")?;
        Ok(Self {
            file,
            start,
            limit,
            chunk,
            release_fd,
        })
    }

    /// Descriptor to close once the stream has finished.
    pub fn release_fd(&self) -> Option<i64> {
        self.release_fd
    }

    /// Copy the byte range to `out` in chunks, then shut `out` down.
    pub async fn pump<W: AsyncWrite + Unpin>(self, out: &mut W) -> std::io::Result<u64> {
        let mut file = tokio::fs::File::from_std(self.file);
        if let Some(start) = self.start {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let mut remaining = self.limit;
        let mut buf = vec![0u8; self.chunk];
        let mut sent = 0u64;
        loop {
            let want = match remaining {
                Some(0) => break,
                Some(left) => buf.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
                None => buf.len(),
            };
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            sent += n as u64;
            remaining = remaining.map(|left| left - n as u64);
        }
        out.shutdown().await?;
        Ok(sent)
    }
}

/// The remote end of a write stream.
#[derive(Debug)]
pub struct WriteSink {
    file: File,
    start: Option<u64>,
    release_fd: Option<i64>,
}

impl WriteSink {
    /// Open from `createWriteStream` arguments.
    pub fn open(host: &HostFs, args: &[Value]) -> HostResult<Self> {
        let start = start_offset(arg(args, 1))?;
        let (file, release_fd) = open_file(host, args, "w", "write")?;
        Ok(Self {
            file,
            start,
            release_fd,
        })
    }

    pub fn release_fd(&self) -> Option<i64> {
        self.release_fd
    }

    /// Copy everything from `input` into the file until EOF.
    pub async fn pump<R: AsyncRead + Unpin>(self, input: &mut R) -> std::io::Result<u64> {
        let mut file = tokio::fs::File::from_std(self.file);
        if let Some(start) = self.start {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let copied = tokio::io::copy(input, &mut file).await?;
        file.flush().await?;
        Ok(copied)
    }
}
