//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default server address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:7878";

/// Upper bound on one request/response round trip, connect included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// `watchFile` polling interval when the caller gives none.
pub const DEFAULT_WATCH_FILE_INTERVAL: Duration = Duration::from_millis(5007);

/// Watcher events buffered per subscriber before the slowest one lags.
pub const WATCH_EVENT_CAPACITY: usize = 256;
