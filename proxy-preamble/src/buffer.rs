use bytes::{Buf, BytesMut};
use std::{cmp, io, ops::Deref};

/// Bounded byte store shared by every call that evaluates one connection's preamble.
///
/// Bytes are only ever appended at the end and removed from the front, so whatever is
/// left after a splice is exactly the application data that arrived behind the header.
#[derive(Debug)]
pub struct HeaderBuffer {
    inner: BytesMut,
    capacity: usize,
}

impl HeaderBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        HeaderBuffer {
            inner: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of bytes the buffer holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free space left
    pub fn remaining(&self) -> usize {
        self.capacity - self.inner.len()
    }

    /// Append up to `max` bytes produced by `read`, bounded by the free space.
    ///
    /// `read` receives a zeroed slot and returns how much of it it filled. On error
    /// the buffer is left as it was.
    pub fn fill_with<F>(&mut self, max: usize, read: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        let start = self.inner.len();
        let want = cmp::min(max, self.remaining());
        self.inner.resize(start + want, 0);
        match read(&mut self.inner[start..]) {
            Ok(n) => {
                let n = cmp::min(n, want);
                self.inner.truncate(start + n);
                Ok(n)
            }
            Err(e) => {
                self.inner.truncate(start);
                Err(e)
            }
        }
    }

    /// Drop the first `n` bytes and move the rest to the front
    pub fn consume(&mut self, n: usize) {
        let n = cmp::min(n, self.inner.len());
        self.inner.advance(n);
    }

    /// Consume the buffer
    pub fn into_inner(self) -> BytesMut {
        self.inner
    }
}

impl Deref for HeaderBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner
    }
}

impl AsRef<[u8]> for HeaderBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

#[cfg(test)]
mod test {
    use super::HeaderBuffer;
    use std::io;

    fn fill(buffer: &mut HeaderBuffer, data: &[u8]) -> usize {
        buffer
            .fill_with(data.len(), |dst| {
                let n = dst.len();
                dst.copy_from_slice(&data[..n]);
                Ok(n)
            })
            .unwrap()
    }

    #[test]
    fn test_fill_is_bounded_by_capacity() {
        let mut buffer = HeaderBuffer::with_capacity(8);
        assert_eq!(buffer.capacity(), 8);

        assert_eq!(fill(&mut buffer, b"12345"), 5);
        assert_eq!(buffer.remaining(), 3);
        assert_eq!(fill(&mut buffer, b"6789ab"), 3);
        assert_eq!(&buffer[..], b"12345678");
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_short_and_failed_reads() {
        let mut buffer = HeaderBuffer::with_capacity(8);
        fill(&mut buffer, b"ab");

        let n = buffer
            .fill_with(4, |dst| {
                dst[0] = b'c';
                Ok(1)
            })
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buffer[..], b"abc");

        let err = buffer
            .fill_with(4, |dst| {
                dst[0] = b'x';
                Err(io::ErrorKind::WouldBlock.into())
            })
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(&buffer[..], b"abc");
    }

    #[test]
    fn test_consume_keeps_trailing_bytes() {
        let mut buffer = HeaderBuffer::with_capacity(16);
        fill(&mut buffer, b"line\r\nrest");

        buffer.consume(6);
        assert_eq!(&buffer[..], b"rest");
        assert_eq!(buffer.remaining(), 12);

        // compacted space is usable again
        fill(&mut buffer, b"0123456789ab");
        assert_eq!(&buffer[..], b"rest0123456789ab");
    }

    #[test]
    fn test_consume_everything() {
        let mut buffer = HeaderBuffer::with_capacity(16);
        fill(&mut buffer, b"line\r\n");

        buffer.consume(6);
        assert!(buffer.is_empty());
        buffer.consume(1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.remaining(), 16);
    }
}
