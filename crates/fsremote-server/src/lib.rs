//! # fsremote-server
//!
//! Serves the fs-remote operation registry over TCP.
//!
//! ```text
//!   client ──── main channel (NDJSON) ────▶ RpcServer
//!                                             └── Dispatcher ──▶ HostFs
//!   client ◀─── side channel (per watch/stream) ── SideChannels
//! ```
//!
//! The main channel carries one request per line. `watch`,
//! `createReadStream` and `createWriteStream` answer with the address of a
//! one-shot side channel instead of a marshaled result.

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod loopback;
pub mod rpc;
pub mod side_channel;

pub use config::ServerConfig;
pub use dispatch::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use loopback::LoopbackChannel;
pub use rpc::RpcServer;
pub use side_channel::SideChannels;
