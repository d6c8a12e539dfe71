//! Server configuration constants.
//!
//! Centralizes defaults so the config file, the CLI and tests agree.

use std::time::Duration;

/// Default address for the main request/response channel.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:7878";

/// Default host for side-channel listeners (localhost only).
pub const DEFAULT_SIDE_CHANNEL_HOST: &str = "127.0.0.1";

/// How long a side channel waits for its one peer.
pub const DEFAULT_SIDE_CHANNEL_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunk size for read streams.
pub const DEFAULT_STREAM_HIGH_WATER_MARK: usize = 64 * 1024;

/// Requests slower than this are logged at warn.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(100);
