//! The invocation path end to end without sockets: `RemoteFs` over a
//! `LoopbackChannel` into a `Dispatcher`.

use std::sync::Arc;

use fsremote_client::{FsError, RemoteFs, Value};
use fsremote_server::{Dispatcher, LoopbackChannel, ServerConfig};
use fsremote_types::{MarshalError, Registry, TypedArray, TypedArrayKind};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

fn loopback() -> RemoteFs {
    let dispatcher = Dispatcher::new(
        &ServerConfig::ephemeral(),
        Arc::new(Registry::standard()),
        Handle::current(),
        CancellationToken::new(),
    );
    RemoteFs::new(Arc::new(LoopbackChannel::new(Arc::new(dispatcher))))
}

fn p(path: &std::path::Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mkdir_options_survive_the_wire() {
    let fs = loopback();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("x/y");

    let options = Value::object([("recursive", Value::Bool(true)), ("mode", Value::from(0o755))]);
    fs.call("mkdir", &[p(&target), options]).await.unwrap();
    assert!(fs.stat(p(&target)).await.unwrap().is_directory());

    // Without `recursive` the parent must exist.
    let err = fs.call("mkdir", &[p(&dir.path().join("q/r"))]).await.unwrap_err();
    assert_eq!(err.code(), Some("ENOENT"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_variants() {
    let fs = loopback();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("s.txt");

    fs.call_sync("writeFileSync", &[p(&file), Value::from("sync")]).unwrap();
    assert_eq!(fs.call_sync("existsSync", &[p(&file)]).unwrap(), Value::Bool(true));
    let stats = fs.stat_sync(p(&file)).unwrap();
    assert!(stats.is_file());
    assert_eq!(stats.size, 4.0);

    let fd = fs.call_sync("openSync", &[p(&file)]).unwrap().as_i64().unwrap();
    let n = fs
        .call_sync(
            "readSync",
            &[Value::from(fd), Value::buffer(vec![0; 4]), Value::from(0), Value::from(4), Value::Null],
        )
        .unwrap();
    assert_eq!(n.as_i64(), Some(4));
    fs.call_sync("closeSync", &[Value::from(fd)]).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_typed_array_write() {
    let fs = loopback();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("typed.bin");

    let data = TypedArray::new(TypedArrayKind::Uint8Array, [1.0, 2.0, 3.0]);
    fs.call("writeFile", &[p(&file), Value::from(data)]).await.unwrap();
    let raw = fs.call("readFile", &[p(&file)]).await.unwrap();
    assert_eq!(raw.as_bytes().unwrap(), vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rename_and_readdir_with_buffer_encoding() {
    let fs = loopback();
    let dir = tempfile::tempdir().unwrap();
    let from = dir.path().join("old.txt");
    let to = dir.path().join("new.txt");

    fs.call("writeFile", &[p(&from), Value::from("x")]).await.unwrap();
    fs.call("rename", &[p(&from), p(&to)]).await.unwrap();

    let names = fs.call("readdir", &[p(dir.path()), Value::from("buffer")]).await.unwrap();
    assert_eq!(names, Value::array([Value::buffer(b"new.txt".to_vec())]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_validation_rejects_before_sending() {
    let fs = loopback();
    let err = fs.call("rename", &[Value::from("/only-one")]).await.unwrap_err();
    match err {
        FsError::Marshal(MarshalError::TypeMismatch { expected, .. }) => {
            assert!(expected.starts_with("[string | Buffer | URL, string | Buffer | URL]"), "{expected}");
        }
        other => panic!("expected a type mismatch, got {other:?}"),
    }
}
