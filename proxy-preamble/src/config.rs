//! Configuration of the preamble reader

use std::time::Duration;

/// Bytes requested per read once the smallest plausible line has arrived
pub const DEFAULT_READ_CHUNK: usize = 3;
/// Outstanding bytes above which a would-block read refreshes connection activity
pub const DEFAULT_KEEPALIVE_THRESHOLD: usize = 1000;
/// Default time allowed for the preamble to resolve in async mode
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of the preamble reader
///
/// Wire level sizes (signature, maximum and minimum line length) are fixed for
/// interoperability and are not part of the configuration.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Read size used after the first [`MIN_HEADER_SIZE`](crate::MIN_HEADER_SIZE)
    /// bytes. Small values avoid pulling application payload into the header buffer,
    /// large values save read calls. Zero is treated as one.
    pub read_chunk: usize,

    /// When a read would block and the connection's keepalive reports more outstanding
    /// bytes than this, the keepalive is told the connection is still active.
    pub keepalive_threshold: usize,

    /// Upper bound for [`read_proxy_header`](crate::read_proxy_header)
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            read_chunk: DEFAULT_READ_CHUNK,
            keepalive_threshold: DEFAULT_KEEPALIVE_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
