//! End-to-end tests over TCP: a real server on an ephemeral port, driven
//! through the client crate.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fsremote_client::{ClientConfig, FsError, RemoteFs, TcpChannel, Value, WatcherEvent};
use fsremote_server::{RpcServer, ServerConfig};
use fsremote_types::{RemoteErrorKind, RpcChannel, RpcError, Stats};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Start a server on an ephemeral port; cancel the token to stop it.
async fn start_server() -> (RemoteFs, CancellationToken) {
    let (config, shutdown) = start_raw_server().await;
    (RemoteFs::connect(config), shutdown)
}

async fn start_raw_server() -> (ClientConfig, CancellationToken) {
    let server = RpcServer::bind(&ServerConfig::ephemeral()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("server error: {e}");
        }
    });
    let config = ClientConfig::new(addr.to_string()).with_call_timeout(Duration::from_secs(10));
    (config, shutdown)
}

fn p(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

/// Retry `check` until it returns true or five seconds pass.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition never became true");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mkdir_recursive_then_stat() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b/c");

    let options = Value::object([("recursive", Value::Bool(true))]);
    fs.call("mkdir", &[p(&nested), options]).await.unwrap();

    let stats = fs.stat(p(&nested)).await.unwrap();
    assert!(stats.is_directory());
    assert!(!stats.is_file());

    let stats = tokio::task::block_in_place(|| fs.stat_sync(p(&dir.path().join("a")))).unwrap();
    assert!(stats.is_directory());
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_then_read_file() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("greeting.txt");

    fs.call("writeFile", &[p(&file), Value::from("hello")]).await.unwrap();
    fs.call("appendFile", &[p(&file), Value::from(" world")]).await.unwrap();

    let text = fs.call("readFile", &[p(&file), Value::from("utf8")]).await.unwrap();
    assert_eq!(text, Value::from("hello world"));

    let raw = fs.call("readFile", &[p(&file)]).await.unwrap();
    assert_eq!(raw.as_bytes().unwrap(), b"hello world");

    let listing = fs.call("readdir", &[p(dir.path())]).await.unwrap();
    assert_eq!(listing, Value::array([Value::from("greeting.txt")]));
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_file_reports_enoent() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = fs.call("unlink", &[p(&missing)]).await.unwrap_err();
    assert_eq!(err.code(), Some("ENOENT"));
    match err {
        FsError::Remote(remote) => assert_eq!(remote.syscall.as_deref(), Some("unlink")),
        other => panic!("expected remote error, got {other:?}"),
    }

    assert!(!fs.exists(p(&missing)).await.unwrap());
    assert!(fs.exists(p(dir.path())).await.unwrap());
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_descriptor_round_trip() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("fd.bin");

    let fd = fs
        .call("open", &[p(&file), Value::from("w+")])
        .await
        .unwrap()
        .as_i64()
        .unwrap();

    let (written, echoed) = fs.write(&[Value::from(fd), Value::from("hello")]).await.unwrap();
    assert_eq!(written, 5);
    assert_eq!(echoed, Value::from("hello"));

    let (read, buffer) = fs.read(fd, Value::buffer(vec![0; 5]), 0, 5, Some(0)).await.unwrap();
    assert_eq!(read, 5);
    assert_eq!(buffer, b"hello");

    let stats: Stats = fs.fstat(fd).await.unwrap();
    assert_eq!(stats.size, 5.0);
    assert!(stats.is_file());

    fs.call("close", &[Value::from(fd)]).await.unwrap();
    let err = fs.call("close", &[Value::from(fd)]).await.unwrap_err();
    assert_eq!(err.code(), Some("EBADF"));
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_streams_write_then_read() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("stream.txt");

    let mut writer = tokio::task::block_in_place(|| fs.create_write_stream(&[p(&file)])).unwrap();
    writer.write_all(b"0123456789").await.unwrap();
    writer.shutdown().await.unwrap();

    let path = file.clone();
    eventually(|| {
        let path = path.clone();
        async move { tokio::fs::read(&path).await.is_ok_and(|b| b == b"0123456789") }
    })
    .await;

    let range = Value::object([("start", Value::from(2)), ("end", Value::from(5))]);
    let mut reader = tokio::task::block_in_place(|| fs.create_read_stream(&[p(&file), range])).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"2345");
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_stream_open_error_rejects() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let err = tokio::task::block_in_place(|| fs.create_read_stream(&[p(&dir.path().join("missing"))])).unwrap_err();
    assert_eq!(err.code(), Some("ENOENT"));
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watch_reports_new_file_then_closes() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();

    let (tx, mut renames) = mpsc::unbounded_channel();
    let watcher = tokio::task::block_in_place(|| {
        fs.watch(
            &[p(dir.path())],
            Some(Arc::new(move |event_type: &str, data: &Value| {
                let _ = tx.send((event_type.to_string(), data.clone()));
            })),
        )
    })
    .unwrap();
    let mut events = watcher.events();

    tokio::fs::write(dir.path().join("file.txt"), b"x").await.unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                WatcherEvent::Change { data } => break data,
                WatcherEvent::Error(e) => panic!("watch error: {e}"),
                _ => continue,
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(change, Value::from("file.txt"));

    let (event_type, name) = tokio::time::timeout(Duration::from_secs(5), renames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event_type, "rename");
    assert_eq!(name, Value::from("file.txt"));

    watcher.close();
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if events.recv().await.unwrap() == WatcherEvent::Close {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "watcher never closed");
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watch_file_sees_size_change() {
    let (fs, shutdown) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("polled.txt");
    tokio::fs::write(&file, b"a").await.unwrap();

    let (tx, mut changes) = mpsc::unbounded_channel();
    let options = Value::object([("interval", Value::from(50))]);
    fs.watch_file(
        p(&file),
        Some(options),
        Arc::new(move |current: &Stats, previous: &Stats| {
            let _ = tx.send((current.size, previous.size));
        }),
    )
    .unwrap();

    // Let the poller take its baseline.
    tokio::time::sleep(Duration::from_millis(200)).await;
    tokio::fs::write(&file, b"abc").await.unwrap();

    let (current, previous) = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((current, previous), (3.0, 1.0));

    fs.unwatch_file(p(&file)).unwrap();
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_server_rejects_local_only_methods() {
    let (config, shutdown) = start_raw_server().await;
    let channel = TcpChannel::new(config);
    let args = serde_json::json!({"type": "[string | Buffer | URL]", "value": [{"type": "string", "value": "/tmp"}]});

    for method in ["watchFile", "unwatchFile", "noSuchMethod"] {
        match channel.call(method, args.clone()).await {
            Err(RpcError::Remote(e)) => assert_eq!(e.kind, RemoteErrorKind::UnknownMethod, "{method}"),
            other => panic!("{method}: expected unknown method, got {other:?}"),
        }
    }
    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_garbage_line_gets_protocol_error() {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let (config, shutdown) = start_raw_server().await;
    let stream = tokio::net::TcpStream::connect(&config.addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(b"{not json\n").await.unwrap();

    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await.unwrap();
    let response: fsremote_types::Response = serde_json::from_str(&line).unwrap();
    assert_eq!(response.error.unwrap().kind, RemoteErrorKind::Protocol);
    shutdown.cancel();
}
