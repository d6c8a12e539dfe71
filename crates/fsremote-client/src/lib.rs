//! # fsremote-client
//!
//! Calls filesystem operations on a remote fs-remote server as if they were
//! local.
//!
//! ```text
//! RemoteFs::call("mkdir", [path, options])
//!     └── Registry → MethodSpec → marshal::serialize_args
//!     └── RpcChannel (TcpChannel, or any other implementation)
//!     └── marshal::deserialize_result → Value
//!
//! RemoteFs::watch / create_read_stream / create_write_stream
//!     └── blocking setup call → side-channel address
//!     └── FsWatcher / ReadStream / WriteStream connect to it
//! ```
//!
//! `watch_file` / `unwatch_file` never leave the process; they poll `stat`.

pub mod channel;
pub mod constants;
pub mod error;
pub mod fs;
pub mod stream;
pub mod watch_file;
pub mod watcher;

pub use channel::{ClientConfig, TcpChannel};
pub use error::{FsError, FsResult};
pub use fs::RemoteFs;
pub use fsremote_types::{Stats, Value};
pub use stream::{ReadStream, WriteStream};
pub use watch_file::StatListener;
pub use watcher::{FsWatcher, WatchError, WatchListener, WatchState, WatcherEvent, transition};
