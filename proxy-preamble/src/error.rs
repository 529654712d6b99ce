use std::io::{Error as IOError, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Reasons a line that starts with the signature is rejected
pub enum HeaderError {
    /// The line feed is not preceded by a carriage return
    #[error("line feed is not preceded by a carriage return")]
    MissingCarriageReturn,
    /// The buffer filled up before a line terminator arrived
    #[error("no line terminator within `{0}` bytes")]
    Oversized(usize),
    /// The line is not valid text
    #[error("header line is not valid text")]
    NotText,
    /// The first token is not the `PROXY` keyword
    #[error("header line does not start with the PROXY keyword")]
    MissingKeyword,
    /// Wrong number of fields after the keyword
    #[error("expected 5 fields after the keyword, got `{0}`")]
    TokenCount(usize),
    /// Family tag is neither `TCP4` nor `TCP6`
    #[error("unknown address family `{0}`")]
    UnknownFamily(String),
    /// A host field does not fit its slot
    #[error("host of `{0}` bytes does not fit")]
    HostTooLong(usize),
    /// A port field is not a base-10 port number
    #[error("invalid port `{0}`")]
    InvalidPort(String),
}

#[derive(Error, Debug)]
/// Errors surfaced while evaluating a connection's preamble
pub enum ProxyError {
    /// The preamble is present but broken, the connection should be closed
    #[error("malformed proxy header: `{0}`")]
    Malformed(#[from] HeaderError),
    /// Storage for the extracted address could not be acquired
    #[error("can not allocate remote address")]
    AllocationFailure,
    /// Peer reset or closed the connection before the preamble resolved
    #[error("connection reset while reading proxy header")]
    ConnectionReset,
    /// Any other transport failure
    #[error("proxy header io error: `{0:?}`")]
    Io(IOError),
    /// The preamble did not resolve within the configured timeout
    #[error("proxy header read timeout")]
    Timeout,
}

impl ProxyError {
    /// Protocol violation, as opposed to a transport failure
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProxyError::Malformed(_))
    }

    /// Header rejected because no terminator arrived in time
    pub fn is_oversized(&self) -> bool {
        matches!(self, ProxyError::Malformed(HeaderError::Oversized(_)))
    }
}

impl From<IOError> for ProxyError {
    fn from(err: IOError) -> ProxyError {
        match err.kind() {
            ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => ProxyError::ConnectionReset,
            _ => ProxyError::Io(err),
        }
    }
}
