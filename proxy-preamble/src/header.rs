//! PROXY protocol v1 line verification
//!
//! Format: "PROXY <INET_PROTO> <SRC_ADDR> <DST_ADDR> <SRC_PORT> <DST_PORT>\r\n"
//! Example: "PROXY TCP4 192.168.0.1 192.168.0.11 56324 443\r\n"
//!
//! Reference: https://www.haproxy.org/download/1.8/doc/proxy-protocol.txt

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use crate::{
    CR, HOST_SIZE, LF, MAX_HEADER_SIZE, MIN_HEADER_SIZE, SIGNATURE, TCP4, TCP6,
    error::{HeaderError, ProxyError},
};

/// Address family announced by the family tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// `TCP4`
    Ipv4,
    /// `TCP6`
    Ipv6,
}

impl AddressFamily {
    /// Map a family tag, anything but `TCP4`/`TCP6` is unknown
    pub fn from_tag(tag: &str) -> Option<AddressFamily> {
        match tag {
            TCP4 => Some(AddressFamily::Ipv4),
            TCP6 => Some(AddressFamily::Ipv6),
            _ => None,
        }
    }

    /// The wire tag
    pub fn tag(self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => TCP4,
            AddressFamily::Ipv6 => TCP6,
        }
    }
}

/// Original client address as stated by the load balancer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteAddress {
    /// Announced family
    pub family: AddressFamily,
    /// Source host, verbatim
    pub host: String,
    /// Source port
    pub port: u16,
}

impl RemoteAddress {
    /// Interpret the verbatim host as an address of the announced family.
    ///
    /// The line is never checked for this, `None` means the host does not parse
    /// or belongs to the other family.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip = match self.family {
            AddressFamily::Ipv4 => IpAddr::V4(self.host.parse::<Ipv4Addr>().ok()?),
            AddressFamily::Ipv6 => IpAddr::V6(self.host.parse::<Ipv6Addr>().ok()?),
        };
        Some(SocketAddr::new(ip, self.port))
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            AddressFamily::Ipv4 => write!(f, "{}:{}", self.host, self.port),
            AddressFamily::Ipv6 => write!(f, "[{}]:{}", self.host, self.port),
        }
    }
}

/// Result of scanning the accumulated bytes for a complete line
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Keep reading
    Incomplete,
    /// A CRLF terminated line of this many bytes, terminator included, is at the front
    Complete(usize),
}

/// Look for a complete, correctly terminated line at the front of `buf`.
///
/// Nothing is searched below [`MIN_HEADER_SIZE`] bytes. A full window without a
/// line feed is oversized.
pub fn verify(buf: &[u8]) -> Result<Verdict, HeaderError> {
    if buf.len() < MIN_HEADER_SIZE {
        return Ok(Verdict::Incomplete);
    }

    let window = &buf[..buf.len().min(MAX_HEADER_SIZE)];
    match window[SIGNATURE.len()..].iter().position(|b| *b == LF) {
        Some(offset) => {
            let lf = SIGNATURE.len() + offset;
            if window[lf - 1] != CR {
                return Err(HeaderError::MissingCarriageReturn);
            }
            Ok(Verdict::Complete(lf + 1))
        }
        None if buf.len() >= MAX_HEADER_SIZE => Err(HeaderError::Oversized(buf.len())),
        None => Ok(Verdict::Incomplete),
    }
}

/// Fields of a verified line, borrowed from the buffer
#[derive(Debug, PartialEq, Eq)]
pub struct HeaderLine<'a> {
    /// Announced family
    pub family: AddressFamily,
    /// Source host
    pub src_host: &'a str,
    /// Destination host, the load balancer's own socket
    pub dst_host: &'a str,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
}

impl<'a> HeaderLine<'a> {
    /// Tokenize a line, with or without its CRLF terminator
    pub fn parse(line: &'a [u8]) -> Result<HeaderLine<'a>, HeaderError> {
        let text = std::str::from_utf8(line).map_err(|_| HeaderError::NotText)?;
        let mut tokens = text.split_ascii_whitespace();

        if tokens.next().map(str::as_bytes) != Some(&SIGNATURE[..]) {
            return Err(HeaderError::MissingKeyword);
        }

        let fields: Vec<&str> = tokens.collect();
        let &[tag, src_host, dst_host, src_port, dst_port] = fields.as_slice() else {
            return Err(HeaderError::TokenCount(fields.len()));
        };

        let family =
            AddressFamily::from_tag(tag).ok_or_else(|| HeaderError::UnknownFamily(tag.into()))?;

        Ok(HeaderLine {
            family,
            src_host: check_host(src_host)?,
            dst_host: check_host(dst_host)?,
            src_port: parse_port(src_port)?,
            dst_port: parse_port(dst_port)?,
        })
    }

    /// Copy the source side out of the buffer
    pub fn remote_address(&self) -> Result<RemoteAddress, ProxyError> {
        let mut host = String::new();
        host.try_reserve_exact(self.src_host.len())
            .map_err(|_| ProxyError::AllocationFailure)?;
        host.push_str(self.src_host);

        Ok(RemoteAddress {
            family: self.family,
            host,
            port: self.src_port,
        })
    }
}

fn check_host(host: &str) -> Result<&str, HeaderError> {
    // one slot is the terminator's
    if host.len() >= HOST_SIZE {
        return Err(HeaderError::HostTooLong(host.len()));
    }
    Ok(host)
}

fn parse_port(port: &str) -> Result<u16, HeaderError> {
    port.parse::<u16>()
        .map_err(|_| HeaderError::InvalidPort(port.into()))
}
