//! Request dispatch.
//!
//! The server-side half of the invocation path:
//!
//! ```text
//! Request{method, args}
//!     └── Registry::get(method)            unknown → UnknownMethod
//!     └── Envelope::from_json + deserialize_args
//!     └── HostFs (simple op / special kind)
//!     └── serialize_result                 side channels: bare address
//! Response{result | error}
//! ```
//!
//! Dispatch is synchronous and may block on the filesystem; async callers go
//! through `spawn_blocking`.

use fsremote_kernel::host::args::{self, arg};
use fsremote_kernel::{HostError, HostFs, HostWatcher, ReadSource, WatchOptions, WriteSink};
use fsremote_types::{
    Envelope, MethodKind, MethodSpec, Registry, RemoteError, Request, Response, SpecialKind, Value,
    marshal,
};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::constants::SLOW_REQUEST_THRESHOLD;
use crate::side_channel::{self, SideChannels};

/// Routes requests to the host.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    host: Arc<HostFs>,
    side_channels: SideChannels,
    high_water_mark: usize,
}

impl Dispatcher {
    /// Side channels are spawned on `runtime` and cancelled with `shutdown`.
    pub fn new(
        config: &ServerConfig,
        registry: Arc<Registry>,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            host: Arc::new(HostFs::new()),
            side_channels: SideChannels::new(
                config.side_channel_host.clone(),
                config.side_channel_accept_timeout(),
                runtime,
                shutdown,
            ),
            high_water_mark: config.stream_high_water_mark,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn host(&self) -> &Arc<HostFs> {
        &self.host
    }

    /// Handle one request. Never fails; errors become error responses.
    pub fn dispatch(&self, request: &Request) -> Response {
        let start = Instant::now();
        let result = self.handle(&request.method, &request.args);
        let elapsed = start.elapsed();

        match &result {
            Err(e) => tracing::debug!(
                method = %request.method,
                kind = ?e.kind,
                code = e.code.as_deref().unwrap_or(""),
                error = %e,
                "request failed"
            ),
            Ok(_) if elapsed > SLOW_REQUEST_THRESHOLD => tracing::warn!(
                method = %request.method,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow request"
            ),
            Ok(_) => tracing::trace!(
                method = %request.method,
                elapsed_us = elapsed.as_micros() as u64,
                "request completed"
            ),
        }

        match result {
            Ok(json) => Response::success(request.id.clone(), json),
            Err(e) => Response::failure(request.id.clone(), e),
        }
    }

    fn handle(&self, method: &str, args: &Json) -> Result<Json, RemoteError> {
        let spec = self
            .registry
            .get(method)
            .filter(|spec| spec.special_kind().is_none_or(SpecialKind::is_remote))
            .ok_or_else(|| RemoteError::unknown_method(method))?;

        let envelope = Envelope::from_json(args)?;
        let args = marshal::deserialize_args(spec, &envelope)?;
        let op = spec.host_op();

        let value = match spec.kind {
            MethodKind::Simple => self.host.execute(op, &args)?,
            MethodKind::Special(kind) => match kind {
                SpecialKind::Exists => self.host.exists(&args),
                SpecialKind::Stat => self.host.stat(op, &args)?,
                SpecialKind::Read => self.host.read_record(&args)?,
                SpecialKind::Write => self.host.write_record(&args)?,
                SpecialKind::Watch => return self.open_watch(&args).map(Json::String),
                SpecialKind::CreateReadStream => {
                    return self.open_read_stream(&args).map(Json::String);
                }
                SpecialKind::CreateWriteStream => {
                    return self.open_write_stream(&args).map(Json::String);
                }
                SpecialKind::WatchFile | SpecialKind::UnwatchFile => {
                    return Err(RemoteError::unknown_method(method));
                }
            },
        };

        encode_result(spec, &value)
    }

    fn open_watch(&self, args: &[Value]) -> Result<String, RemoteError> {
        let path = args::path(arg(args, 0))?;
        let options = WatchOptions::from_value(arg(args, 1))?;
        let (watcher, frames) = HostWatcher::start(&path, options)?;
        self.side_channels
            .open("watch", move |stream, shutdown| {
                side_channel::serve_watch(stream, watcher, frames, shutdown)
            })
            .map_err(|e| listen_failed(e, "watch"))
    }

    fn open_read_stream(&self, args: &[Value]) -> Result<String, RemoteError> {
        let source = ReadSource::open(&self.host, args, self.high_water_mark)?;
        let host = Arc::clone(&self.host);
        self.side_channels
            .open("read_stream", move |stream, shutdown| {
                side_channel::serve_read(stream, source, host, shutdown)
            })
            .map_err(|e| listen_failed(e, "createReadStream"))
    }

    fn open_write_stream(&self, args: &[Value]) -> Result<String, RemoteError> {
        let sink = WriteSink::open(&self.host, args)?;
        let host = Arc::clone(&self.host);
        self.side_channels
            .open("write_stream", move |stream, shutdown| {
                side_channel::serve_write(stream, sink, host, shutdown)
            })
            .map_err(|e| listen_failed(e, "createWriteStream"))
    }
}

/// A result the host produced that its own schema rejects is a server bug.
fn encode_result(spec: &MethodSpec, value: &Value) -> Result<Json, RemoteError> {
    marshal::serialize_result(spec, value)
        .map(Envelope::into_json)
        .map_err(|e| {
            tracing::error!(method = spec.name, error = %e, "host result failed its schema");
            RemoteError::internal(e.to_string())
        })
}

fn listen_failed(err: std::io::Error, syscall: &'static str) -> RemoteError {
    HostError::io(err, syscall, None).into()
}
