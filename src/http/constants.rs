//! Constants for the http module (timeouts, streaming, progress throttling).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large bodies).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default redirect hop limit when automatic redirects are enabled.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Upper bound accepted for `max_redirects` in configuration.
pub const MAX_REDIRECTS_LIMIT: usize = 50;

/// Size of the slices written to the sink while streaming a response body.
pub const STREAM_CHUNK_SIZE: usize = 4096;

/// Minimum wall time between two progress callback invocations.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
