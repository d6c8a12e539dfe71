//! The remote invocation adapter.
//!
//! [`RemoteFs`] resolves an operation in its [`Registry`], validates and
//! serializes the arguments, sends them over an [`RpcChannel`], and
//! deserializes and validates the reply. Special operations get typed
//! wrappers on top of that path.

use fsremote_types::{
    Envelope, MarshalError, MethodSpec, Registry, RpcChannel, SpecialKind, Stats, Value, marshal,
};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::channel::{ClientConfig, TcpChannel};
use crate::constants::DEFAULT_WATCH_FILE_INTERVAL;
use crate::error::{FsError, FsResult};
use crate::stream::{ReadStream, WriteStream};
use crate::watch_file::{StatListener, StatPollers};
use crate::watcher::{FsWatcher, WatchListener};

/// Registry plus channel: everything needed to make one call.
pub(crate) struct Core {
    channel: Arc<dyn RpcChannel>,
    registry: Arc<Registry>,
}

impl Core {
    /// Look up `name` and check it is called with the right convention.
    fn spec(&self, name: &str, sync: bool) -> FsResult<&MethodSpec> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| FsError::UnknownMethod(name.to_string()))?;
        if spec.special_kind().is_some_and(|kind| !kind.is_remote()) {
            return Err(FsError::UnknownMethod(name.to_string()));
        }
        if spec.sync != sync {
            return Err(FsError::WrongConvention {
                method: name.to_string(),
                sync: spec.sync,
            });
        }
        Ok(spec)
    }

    pub(crate) async fn call(&self, name: &str, args: &[Value]) -> FsResult<Value> {
        let spec = self.spec(name, false)?;
        let envelope = marshal::serialize_args(spec, args)?;
        tracing::debug!(method = name, "remote call");
        let reply = self.channel.call(name, envelope.into_json()).await?;
        finish(spec, &reply)
    }

    fn call_sync(&self, name: &str, args: &[Value]) -> FsResult<Value> {
        let spec = self.spec(name, true)?;
        let envelope = marshal::serialize_args(spec, args)?;
        tracing::debug!(method = name, "remote blocking call");
        let reply = self.channel.call_sync(name, envelope.into_json())?;
        finish(spec, &reply)
    }

    /// Blocking setup call for a side channel; the reply is its address.
    fn open_side_channel(&self, name: &str, args: &[Value]) -> FsResult<String> {
        let spec = self.spec(name, true)?;
        let envelope = marshal::serialize_args(spec, args)?;
        tracing::debug!(method = name, "opening side channel");
        match self.channel.call_sync(name, envelope.into_json())? {
            Json::String(addr) => Ok(addr),
            other => Err(MarshalError::MalformedEnvelope(format!(
                "{name} should answer with a socket address, got {other}"
            ))
            .into()),
        }
    }
}

fn finish(spec: &MethodSpec, reply: &Json) -> FsResult<Value> {
    let envelope = Envelope::from_json(reply)?;
    Ok(marshal::deserialize_result(spec, &envelope)?)
}

/// Filesystem API whose operations run on the remote side.
pub struct RemoteFs {
    core: Arc<Core>,
    pollers: StatPollers,
}

impl std::fmt::Debug for RemoteFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFs")
            .field("watched_files", &self.pollers.len())
            .finish_non_exhaustive()
    }
}

impl RemoteFs {
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self::with_registry(channel, Arc::new(Registry::standard()))
    }

    pub fn with_registry(channel: Arc<dyn RpcChannel>, registry: Arc<Registry>) -> Self {
        Self {
            core: Arc::new(Core { channel, registry }),
            pollers: StatPollers::default(),
        }
    }

    /// Talk to a server over TCP.
    pub fn connect(config: ClientConfig) -> Self {
        Self::new(Arc::new(TcpChannel::new(config)))
    }

    pub fn registry(&self) -> &Registry {
        &self.core.registry
    }

    /// Call a non-blocking operation by name.
    pub async fn call(&self, name: &str, args: &[Value]) -> FsResult<Value> {
        self.core.call(name, args).await
    }

    /// Call a blocking operation by name. Blocks the current thread.
    pub fn call_sync(&self, name: &str, args: &[Value]) -> FsResult<Value> {
        self.core.call_sync(name, args)
    }

    // ------------------------------------------------------------------------
    // Status queries
    // ------------------------------------------------------------------------

    pub async fn stat(&self, path: impl Into<Value>) -> FsResult<Stats> {
        to_stats(self.call("stat", &[path.into()]).await?)
    }

    pub async fn lstat(&self, path: impl Into<Value>) -> FsResult<Stats> {
        to_stats(self.call("lstat", &[path.into()]).await?)
    }

    pub async fn fstat(&self, fd: i64) -> FsResult<Stats> {
        to_stats(self.call("fstat", &[Value::from(fd)]).await?)
    }

    pub fn stat_sync(&self, path: impl Into<Value>) -> FsResult<Stats> {
        to_stats(self.call_sync("statSync", &[path.into()])?)
    }

    pub fn lstat_sync(&self, path: impl Into<Value>) -> FsResult<Stats> {
        to_stats(self.call_sync("lstatSync", &[path.into()])?)
    }

    pub fn fstat_sync(&self, fd: i64) -> FsResult<Stats> {
        to_stats(self.call_sync("fstatSync", &[Value::from(fd)])?)
    }

    // ------------------------------------------------------------------------
    // Multi-value results
    // ------------------------------------------------------------------------

    /// Read into a copy of `buffer`; returns the byte count and the filled
    /// buffer.
    pub async fn read(
        &self,
        fd: i64,
        buffer: impl Into<Value>,
        offset: usize,
        length: usize,
        position: Option<i64>,
    ) -> FsResult<(usize, Vec<u8>)> {
        let args = [
            Value::from(fd),
            buffer.into(),
            Value::from(offset),
            Value::from(length),
            position.map_or(Value::Null, Value::from),
        ];
        let record = self.call("read", &args).await?;
        let bytes_read = count(&record, "bytesRead")?;
        let buffer = record
            .field("buffer")
            .as_bytes()
            .ok_or_else(|| MarshalError::mismatch("Buffer", record.field("buffer")))?;
        Ok((bytes_read, buffer))
    }

    /// Write with any of the `write` overloads, e.g. `[fd, data]` or
    /// `[fd, buffer, offset, length, position]`. Returns the byte count and
    /// the data written.
    pub async fn write(&self, args: &[Value]) -> FsResult<(usize, Value)> {
        let record = self.call("write", args).await?;
        let bytes_written = count(&record, "bytesWritten")?;
        Ok((bytes_written, record.field("bufferOrString").clone()))
    }

    /// Whether `path` exists on the remote side. Only transport and
    /// marshaling failures are errors.
    pub async fn exists(&self, path: impl Into<Value>) -> FsResult<bool> {
        let value = self.call("exists", &[path.into()]).await?;
        value
            .as_bool()
            .ok_or_else(|| MarshalError::mismatch("boolean", &value).into())
    }

    // ------------------------------------------------------------------------
    // Side channels
    // ------------------------------------------------------------------------

    /// Watch a remote path. `args` is `[path]` or `[path, options]`.
    ///
    /// Blocks for the setup call, then connects in the background on the
    /// current tokio runtime.
    pub fn watch(&self, args: &[Value], listener: Option<WatchListener>) -> FsResult<FsWatcher> {
        let runtime = Handle::try_current().map_err(|_| FsError::NoRuntime("watch"))?;
        let addr = self.core.open_side_channel("watch", args)?;
        Ok(FsWatcher::connect(addr, listener, &runtime))
    }

    /// `args` is `[path]` or `[path, options]`. Open failures reject here.
    pub fn create_read_stream(&self, args: &[Value]) -> FsResult<ReadStream> {
        let addr = self.core.open_side_channel("createReadStream", args)?;
        Ok(ReadStream::new(addr))
    }

    /// `args` is `[path]` or `[path, options]`. Open failures reject here.
    pub fn create_write_stream(&self, args: &[Value]) -> FsResult<WriteStream> {
        let addr = self.core.open_side_channel("createWriteStream", args)?;
        Ok(WriteStream::new(addr))
    }

    // ------------------------------------------------------------------------
    // Stat polling
    // ------------------------------------------------------------------------

    /// Poll `path` and call `listener(current, previous)` when it changes.
    ///
    /// `options` may carry `interval` in milliseconds (default 5007).
    /// Listeners on the same path share one poller.
    pub fn watch_file(&self, path: impl Into<Value>, options: Option<Value>, listener: StatListener) -> FsResult<()> {
        let runtime = Handle::try_current().map_err(|_| FsError::NoRuntime("watchFile"))?;
        let path = path.into();
        let mut args = vec![path.clone()];
        args.extend(options.clone());
        self.check_local("watchFile", &args)?;

        let interval = options
            .as_ref()
            .and_then(|o| o.field("interval").as_i64())
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_WATCH_FILE_INTERVAL, |ms| Duration::from_millis(ms as u64));
        self.pollers
            .add(&runtime, Arc::clone(&self.core), path, interval, listener);
        Ok(())
    }

    /// Stop polling `path` and drop all of its listeners.
    pub fn unwatch_file(&self, path: impl Into<Value>) -> FsResult<()> {
        let path = path.into();
        self.check_local("unwatchFile", std::slice::from_ref(&path))?;
        self.pollers.remove(&path);
        Ok(())
    }

    /// Validate arguments of an operation that never leaves this process.
    fn check_local(&self, name: &str, args: &[Value]) -> FsResult<()> {
        let spec = self
            .core
            .registry
            .get(name)
            .filter(|spec| matches!(spec.special_kind(), Some(SpecialKind::WatchFile | SpecialKind::UnwatchFile)))
            .ok_or_else(|| FsError::UnknownMethod(name.to_string()))?;
        marshal::validate(&Value::array(args.iter().cloned()), &spec.args)?;
        Ok(())
    }
}

fn to_stats(value: Value) -> FsResult<Stats> {
    Ok(Stats::from_value(&value)?)
}

fn count(record: &Value, field: &str) -> FsResult<usize> {
    record
        .field(field)
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| MarshalError::mismatch("integer", record.field(field)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fsremote_types::{RemoteError, RemoteErrorKind, RpcError, stats_record};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Channel that records calls and answers from a fixed closure.
    struct Canned {
        calls: Mutex<Vec<(String, Json, bool)>>,
        reply: Box<dyn Fn(&str, &Json) -> Result<Json, RpcError> + Send + Sync>,
    }

    impl Canned {
        fn new(reply: impl Fn(&str, &Json) -> Result<Json, RpcError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply: Box::new(reply),
            })
        }
    }

    #[async_trait]
    impl RpcChannel for Canned {
        async fn call(&self, method: &str, args: Json) -> Result<Json, RpcError> {
            let out = (self.reply)(method, &args);
            self.calls.lock().push((method.to_string(), args, false));
            out
        }

        fn call_sync(&self, method: &str, args: Json) -> Result<Json, RpcError> {
            let out = (self.reply)(method, &args);
            self.calls.lock().push((method.to_string(), args, true));
            out
        }
    }

    fn undefined_reply(_: &str, _: &Json) -> Result<Json, RpcError> {
        Ok(json!({"type": "undefined"}))
    }

    #[tokio::test]
    async fn test_mkdir_sends_two_envelopes() {
        let channel = Canned::new(undefined_reply);
        let fs = RemoteFs::new(channel.clone());
        let options = Value::object([("recursive", Value::Bool(true))]);
        let result = fs.call("mkdir", &[Value::from("/tmp/x"), options]).await.unwrap();
        assert_eq!(result, Value::Undefined);

        let calls = channel.calls.lock();
        let (method, args, sync) = &calls[0];
        assert_eq!(method, "mkdir");
        assert!(!sync);
        let items = args["value"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], json!({"type": "string", "value": "/tmp/x"}));
    }

    #[tokio::test]
    async fn test_invalid_args_never_reach_channel() {
        let channel = Canned::new(undefined_reply);
        let fs = RemoteFs::new(channel.clone());
        let err = fs.call("chmod", &[Value::from("/tmp/x")]).await.unwrap_err();
        assert!(matches!(err, FsError::Marshal(MarshalError::TypeMismatch { .. })), "got {err:?}");
        assert!(channel.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_convention_is_enforced() {
        let fs = RemoteFs::new(Canned::new(undefined_reply));
        let err = fs.call("mkdirSync", &[Value::from("/x")]).await.unwrap_err();
        assert!(matches!(err, FsError::WrongConvention { sync: true, .. }));
        let err = fs.call_sync("mkdir", &[Value::from("/x")]).unwrap_err();
        assert!(matches!(err, FsError::WrongConvention { sync: false, .. }));
        let err = fs.call("nope", &[]).await.unwrap_err();
        assert!(matches!(err, FsError::UnknownMethod(_)));
    }

    #[tokio::test]
    async fn test_stat_predicates() {
        let channel = Canned::new(|_, _| {
            let stats = Stats {
                is_directory: true,
                mode: 0o040755 as f64,
                ..Stats::default()
            };
            Ok(stats_record().serialize(&stats.to_value()).unwrap().into_json())
        });
        let fs = RemoteFs::new(channel);
        let stats = fs.stat("/tmp").await.unwrap();
        assert!(stats.is_directory());
        assert!(!stats.is_file());
    }

    #[tokio::test]
    async fn test_bad_result_is_rejected() {
        let fs = RemoteFs::new(Canned::new(|_, _| Ok(json!({"type": "string", "value": "no"}))));
        let err = fs.call("access", &[Value::from("/x")]).await.unwrap_err();
        assert!(matches!(err, FsError::Marshal(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_remote_error_propagates() {
        let fs = RemoteFs::new(Canned::new(|_, _| {
            let mut err = RemoteError::new(RemoteErrorKind::Host, "ENOENT: no such file or directory, unlink '/x'");
            err.code = Some("ENOENT".into());
            Err(RpcError::Remote(err))
        }));
        let err = fs.call("unlink", &[Value::from("/x")]).await.unwrap_err();
        assert_eq!(err.code(), Some("ENOENT"));
    }

    #[tokio::test]
    async fn test_read_destructures_record() {
        let fs = RemoteFs::new(Canned::new(|method, _| {
            assert_eq!(method, "read");
            let registry = Registry::standard();
            let record = Value::object([("bytesRead", Value::from(3)), ("buffer", Value::buffer(b"abc".to_vec()))]);
            let schema = registry.get("read").unwrap().result.as_ref().unwrap();
            Ok(schema.serialize(&record).unwrap().into_json())
        }));
        let (n, buffer) = fs.read(3, Value::buffer(vec![0; 3]), 0, 3, None).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(buffer, b"abc");
    }

    #[test]
    fn test_side_channel_reply_must_be_address() {
        let fs = RemoteFs::new(Canned::new(|_, _| Ok(json!({"type": "undefined"}))));
        let err = fs.create_read_stream(&[Value::from("/x")]).unwrap_err();
        assert!(matches!(err, FsError::Marshal(MarshalError::MalformedEnvelope(_))));

        let fs = RemoteFs::new(Canned::new(|_, _| Ok(json!("127.0.0.1:4000"))));
        let stream = fs.create_write_stream(&[Value::from("/x")]).unwrap();
        assert_eq!(stream.addr(), "127.0.0.1:4000");
    }

    #[test]
    fn test_watch_needs_runtime() {
        let fs = RemoteFs::new(Canned::new(|_, _| Ok(json!("127.0.0.1:4000"))));
        let err = fs.watch(&[Value::from("/x")], None).unwrap_err();
        assert!(matches!(err, FsError::NoRuntime("watch")));
    }

    #[tokio::test]
    async fn test_watch_file_is_local_only() {
        let channel = Canned::new(undefined_reply);
        let fs = RemoteFs::new(channel.clone());
        let err = fs.call_sync("watchFile", &[Value::from("/x")]).unwrap_err();
        assert!(matches!(err, FsError::UnknownMethod(_)));
        fs.unwatch_file("/never-watched").unwrap();
        assert!(channel.calls.lock().is_empty());
    }
}
