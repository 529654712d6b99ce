//! ## Summary
//!
//! Detection and extraction of a PROXY protocol v1 preamble that a load balancer may
//! put in front of the application bytes of a freshly accepted connection.
//!
//! The preamble is a single text line:
//!
//! ```text
//! PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\n
//! ```
//!
//! ### Concept
//!
//! The reader is a small state machine that is driven by readability events. Each call
//! consumes whatever the transport has ready and returns, it never waits for more data:
//!
//! - while the signature is still being matched, reads are tiny (one or two bytes), so a
//!   stream that does not start with `PROXY` is rejected on its first mismatching byte
//! - once the signature is confirmed, reads grow up to the smallest plausible line and then
//!   proceed in small chunks
//! - when the line is complete it is verified, the original client address is extracted and
//!   the line is spliced out of the buffer
//!
//! Whatever was read past the line (or everything read, for a stream without the preamble)
//! stays in [`HeaderBuffer`] and must be handed to the application protocol parser.
//!
//! The blocking-free core is [`ProxyHeaderReader::read_header`], which works over any
//! non-blocking [`std::io::Read`]. For tokio users [`read_proxy_header`] drives the same
//! core and returns a [`ProxiedStream`] that replays the leftover bytes.
//!
//! ### Example
//!
//! ```rust
//! use proxy_preamble::{ProxyHeaderReader, Status};
//!
//! let mut source: &[u8] = b"PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\nGET /\r\n";
//! let mut reader = ProxyHeaderReader::default();
//!
//! match reader.read_header(&mut source, &mut ()) {
//!     Ok(Status::Proxied) => {
//!         let remote = reader.remote_address().unwrap();
//!         assert_eq!(remote.host, "192.168.0.1");
//!         assert_eq!(remote.port, 56324);
//!     }
//!     other => panic!("unexpected outcome: {:?}", other),
//! }
//!
//! // the application parser resumes with the buffered bytes, then the source
//! let mut leftover = reader.buffer().to_vec();
//! leftover.extend_from_slice(source);
//! assert_eq!(leftover, b"GET /\r\n");
//! ```

#![deny(missing_docs)]

/// Fixed capacity accumulation buffer
pub mod buffer;
/// Reader configuration
pub mod config;
/// Error kinds
pub mod error;
/// Header line verification and address extraction
pub mod header;
/// Top level driver
pub mod reader;
/// Signature matching state
pub mod state;
/// Tokio adapter
pub mod stream;

pub use crate::{
    buffer::HeaderBuffer,
    config::Config,
    error::{HeaderError, ProxyError},
    header::{AddressFamily, RemoteAddress},
    reader::{ByteSource, Keepalive, KeepaliveSender, ProxyHeaderReader, Status},
    state::ProxyState,
    stream::{ProxiedStream, read_proxy_header},
};

/// Literal keyword every v1 preamble starts with
pub const SIGNATURE: &[u8; 5] = b"PROXY";

/// Maximum length of a v1 line, terminator included (107 chars + CRLF)
pub const MAX_HEADER_SIZE: usize = 108;

/// Smallest possible complete TCP4 line, `PROXY TCP4 1.1.1.1 1.1.1.1 1 1\r\n`
pub const MIN_HEADER_SIZE: usize = 32;

/// Capacity of a host string slot, terminator included
pub const HOST_SIZE: usize = 40;

/// Family tag of an IPv4 connection
pub const TCP4: &str = "TCP4";

/// Family tag of an IPv6 connection
pub const TCP6: &str = "TCP6";

pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
