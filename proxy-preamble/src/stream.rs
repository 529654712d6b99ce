use std::{
    cmp, io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::BytesMut;
use futures::future::poll_fn;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{
    config::Config,
    error::ProxyError,
    header::RemoteAddress,
    reader::{Keepalive, ProxyHeaderReader, Status},
};

/// Bridges one poll of an async stream to the non-blocking read the driver expects
struct PollSource<'a, 'b, S: ?Sized> {
    stream: Pin<&'a mut S>,
    cx: &'a mut Context<'b>,
}

impl<S: AsyncRead + ?Sized> io::Read for PollSource<'_, '_, S> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let mut buf = ReadBuf::new(dst);
        match self.stream.as_mut().poll_read(self.cx, &mut buf) {
            Poll::Ready(Ok(())) => Ok(buf.filled().len()),
            Poll::Ready(Err(e)) => Err(e),
            Poll::Pending => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

impl ProxyHeaderReader {
    /// Drive the evaluation from an async stream.
    ///
    /// `Poll::Pending` is returned exactly when the stream had nothing ready, so the
    /// task is woken on the next readability event.
    pub fn poll_read_header<S, K>(
        &mut self,
        cx: &mut Context<'_>,
        stream: Pin<&mut S>,
        keepalive: &mut K,
    ) -> Poll<Result<Status, ProxyError>>
    where
        S: AsyncRead + ?Sized,
        K: Keepalive + ?Sized,
    {
        let mut source = PollSource { stream, cx };
        match self.read_header(&mut source, keepalive) {
            Ok(Status::Wait) => Poll::Pending,
            res => Poll::Ready(res),
        }
    }
}

/// Evaluate the preamble of a freshly accepted stream.
///
/// Returns the stream wrapped so that bytes read past the preamble are replayed first,
/// along with the client address when a preamble was present. A stream without a
/// preamble is not an error, its first bytes are replayed unchanged.
pub async fn read_proxy_header<S>(
    mut stream: S,
    config: Config,
) -> Result<(ProxiedStream<S>, Option<RemoteAddress>), ProxyError>
where
    S: AsyncRead + Unpin,
{
    let mut reader = ProxyHeaderReader::new(config);
    let status = tokio::time::timeout(
        config.timeout,
        poll_fn(|cx| reader.poll_read_header(cx, Pin::new(&mut stream), &mut ())),
    )
    .await
    .map_err(|_| ProxyError::Timeout)??;

    let (prefix, remote) = reader.into_parts();
    debug!(
        "proxy header resolved: {:?}, {} bytes replayed",
        status,
        prefix.len()
    );
    Ok((ProxiedStream::new(prefix, stream), remote))
}

/// Stream that yields the bytes already taken off the wire before reading further
pub struct ProxiedStream<S> {
    prefix: BytesMut,
    inner: S,
}

impl<S> ProxiedStream<S> {
    /// Replay `prefix` before reading from `inner`
    pub fn new(prefix: BytesMut, inner: S) -> Self {
        ProxiedStream { prefix, inner }
    }

    /// Bytes not replayed yet
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutable reference to the underlying stream, reading from it skips the prefix
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Split into the pending prefix and the underlying stream
    pub fn into_parts(self) -> (BytesMut, S) {
        (self.prefix, self.inner)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ProxiedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.prefix.is_empty() && buf.remaining() > 0 {
            let n = cmp::min(this.prefix.len(), buf.remaining());
            buf.put_slice(&this.prefix.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ProxiedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
