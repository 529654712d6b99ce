use std::{
    cmp,
    io::{self, ErrorKind, Read},
    time::Instant,
};

use bytes::BytesMut;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, info, trace};

use crate::{
    MAX_HEADER_SIZE, MIN_HEADER_SIZE,
    buffer::HeaderBuffer,
    config::Config,
    error::{HeaderError, ProxyError},
    header::{self, HeaderLine, RemoteAddress, Verdict},
    state::{ProxyState, match_signature},
};

/// Signature bytes requested per read while matching
const SIGNATURE_READ: usize = 2;

/// Non-blocking byte source of one connection.
///
/// `read_some` must return `ErrorKind::WouldBlock` when nothing is ready instead of
/// waiting. `Ok(0)` means the peer closed.
pub trait ByteSource {
    /// Read up to `dst.len()` bytes
    fn read_some(&mut self, dst: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read + ?Sized> ByteSource for R {
    fn read_some(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.read(dst)
    }
}

/// The connection's idle tracking, told when a slow read is still making sense
pub trait Keepalive {
    /// Bytes the connection still expects to receive
    fn outstanding(&self) -> usize;
    /// A read would block while a lot is outstanding, count the connection as active
    fn still_waiting(&mut self);
}

impl Keepalive for () {
    fn outstanding(&self) -> usize {
        0
    }

    fn still_waiting(&mut self) {}
}

/// Keepalive that forwards activity to the connection's keepalive task
pub struct KeepaliveSender {
    outstanding: usize,
    sender: UnboundedSender<Instant>,
}

impl KeepaliveSender {
    /// Create a sender, activity instants are delivered on `sender`
    pub fn new(sender: UnboundedSender<Instant>) -> Self {
        KeepaliveSender {
            outstanding: 0,
            sender,
        }
    }

    /// Update the amount of data the connection still expects
    pub fn set_outstanding(&mut self, outstanding: usize) {
        self.outstanding = outstanding;
    }
}

impl Keepalive for KeepaliveSender {
    fn outstanding(&self) -> usize {
        self.outstanding
    }

    fn still_waiting(&mut self) {
        if self.sender.unbounded_send(Instant::now()).is_err() {
            trace!("keepalive receiver gone");
        }
    }
}

/// Outcome of a call that did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Nothing more to do until the connection is readable again
    Wait,
    /// Preamble extracted, leftover bytes belong to the application
    Proxied,
    /// No preamble, every byte read belongs to the application
    Direct,
}

/// Fatal outcome kept so later calls report it again
#[derive(Clone, Debug)]
enum Rejection {
    Malformed(HeaderError),
    Allocation,
}

impl Rejection {
    fn to_error(&self) -> ProxyError {
        match self {
            Rejection::Malformed(err) => err.clone().into(),
            Rejection::Allocation => ProxyError::AllocationFailure,
        }
    }
}

/// Per connection preamble evaluation
pub struct ProxyHeaderReader {
    config: Config,
    state: ProxyState,
    buffer: HeaderBuffer,
    remote: Option<RemoteAddress>,
    rejected: Option<Rejection>,
}

impl Default for ProxyHeaderReader {
    fn default() -> Self {
        ProxyHeaderReader::new(Config::default())
    }
}

impl ProxyHeaderReader {
    /// Fresh evaluation, nothing read yet
    pub fn new(config: Config) -> Self {
        ProxyHeaderReader {
            config,
            state: ProxyState::default(),
            buffer: HeaderBuffer::with_capacity(MAX_HEADER_SIZE),
            remote: None,
            rejected: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Bytes read and not part of a preamble
    ///
    /// Only meaningful to the application once the state is terminal.
    pub fn buffer(&self) -> &HeaderBuffer {
        &self.buffer
    }

    /// Mutable access for the application parser to consume the leftover bytes
    pub fn buffer_mut(&mut self) -> &mut HeaderBuffer {
        &mut self.buffer
    }

    /// Extracted client address, set only in the `Valid` state
    pub fn remote_address(&self) -> Option<&RemoteAddress> {
        self.remote.as_ref()
    }

    /// Consume the reader, returning leftover bytes and the extracted address
    pub fn into_parts(self) -> (BytesMut, Option<RemoteAddress>) {
        (self.buffer.into_inner(), self.remote)
    }

    /// Consume whatever `src` has ready and advance the evaluation.
    ///
    /// Returns `Status::Wait` as soon as a read would block. Once a terminal state is
    /// reached no further reads happen: later calls repeat the same outcome.
    pub fn read_header<S, K>(
        &mut self,
        src: &mut S,
        keepalive: &mut K,
    ) -> Result<Status, ProxyError>
    where
        S: ByteSource + ?Sized,
        K: Keepalive + ?Sized,
    {
        loop {
            match self.state {
                ProxyState::Valid => return Ok(Status::Proxied),
                ProxyState::Invalid => {
                    return match self.rejected {
                        Some(ref rejection) => Err(rejection.to_error()),
                        None => Ok(Status::Direct),
                    };
                }
                ProxyState::Unmatched(_) | ProxyState::Reading => (),
            }

            let want = self.next_read_len();
            let n = match self.buffer.fill_with(want, |dst| src.read_some(dst)) {
                Ok(0) => {
                    debug!("connection closed during proxy header, state: {:?}", self.state);
                    return Err(ProxyError::ConnectionReset);
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if keepalive.outstanding() > self.config.keepalive_threshold {
                        keepalive.still_waiting();
                    }
                    trace!(
                        "proxy header would block, state: {:?}, buffered: {}",
                        self.state,
                        self.buffer.len()
                    );
                    return Ok(Status::Wait);
                }
                Err(e) => return Err(e.into()),
            };
            trace!("proxy header read {} of {} bytes", n, want);

            if let ProxyState::Unmatched(_) = self.state {
                let fresh = &self.buffer[self.buffer.len() - n..];
                self.state = match_signature(self.state, fresh);
                if self.state == ProxyState::Invalid {
                    debug!(
                        "no proxy header, {} bytes left for the application",
                        self.buffer.len()
                    );
                }
            } else {
                self.verify()?;
            }
        }
    }

    /// Read size for the current state
    fn next_read_len(&self) -> usize {
        match self.state {
            ProxyState::Unmatched(left) => cmp::min(SIGNATURE_READ, left as usize),
            ProxyState::Reading => {
                let len = self.buffer.len();
                let want = if len < MIN_HEADER_SIZE {
                    MIN_HEADER_SIZE - len
                } else {
                    cmp::max(self.config.read_chunk, 1)
                };
                cmp::min(want, self.buffer.remaining())
            }
            ProxyState::Valid | ProxyState::Invalid => 0,
        }
    }

    fn verify(&mut self) -> Result<(), ProxyError> {
        let line_len = match header::verify(&self.buffer) {
            Ok(Verdict::Incomplete) => return Ok(()),
            Ok(Verdict::Complete(len)) => len,
            Err(err) => return Err(self.fail(Rejection::Malformed(err))),
        };

        if self.remote.is_none() {
            // terminator excluded
            let line = match HeaderLine::parse(&self.buffer[..line_len - 2]) {
                Ok(line) => line,
                Err(err) => return Err(self.fail(Rejection::Malformed(err))),
            };
            let remote = match line.remote_address() {
                Ok(remote) => remote,
                Err(_) => return Err(self.fail(Rejection::Allocation)),
            };
            info!(
                "new connection has remote address {} on port {}",
                remote.host, remote.port
            );
            self.remote = Some(remote);
        }

        self.buffer.consume(line_len);
        self.state = ProxyState::Valid;
        Ok(())
    }

    fn fail(&mut self, rejection: Rejection) -> ProxyError {
        let err = rejection.to_error();
        debug!("proxy header rejected: {}", err);
        self.state = ProxyState::Invalid;
        self.rejected = Some(rejection);
        err
    }
}
