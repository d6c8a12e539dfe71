//! # fsremote-kernel
//!
//! The host side of fs-remote: the code that actually touches the disk.
//!
//! The kernel knows nothing about sockets or envelopes. It takes native
//! argument values that already passed their schema, runs the operation on
//! the local filesystem, and hands back native result values.
//!
//! - [`HostFs`] executes simple operations and the `stat`/`read`/`write`/
//!   `exists` specials, and owns the descriptor table.
//! - [`HostWatcher`] turns `notify` events into watch frames.
//! - [`ReadSource`] and [`WriteSink`] pump bytes between a host file and a
//!   side-channel socket.

pub mod host;
pub mod stream;
pub mod watch;

pub use host::{Encoding, FdTable, HostError, HostFs, HostResult, OpenFlags};
pub use stream::{DEFAULT_HIGH_WATER_MARK, ReadSource, WriteSink};
pub use watch::{HostWatcher, WatchOptions};
