use std::io;

use bytes::{Buf as _, BufMut, BytesMut};

/// Fresh allocation size for a new or shrunk buffer.
pub(crate) const DEFAULT_CAPACITY: usize = 4096;

/// Backing stores larger than this are replaced on `clear`/`reclaim`.
pub(crate) const SHRINK_THRESHOLD: usize = 4 * 1024 * 1024;

/// Growable byte buffer, reused across requests on a keep-alive connection.
///
/// Bytes are appended at the end by a caller-supplied read function and
/// consumed from the front as the parser makes progress. One oversized
/// request must not pin memory for the life of the connection, so clearing
/// an overgrown buffer swaps the backing store for a fresh small one.
pub struct Buffer {
    data: BytesMut,
    shrink_threshold: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer::with_shrink_threshold(SHRINK_THRESHOLD)
    }

    pub fn with_shrink_threshold(shrink_threshold: usize) -> Buffer {
        Buffer {
            data: BytesMut::with_capacity(DEFAULT_CAPACITY),
            shrink_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Grow the spare room if the buffer is full, then append whatever a
    /// single call to `read` produces. Returns the number of bytes read;
    /// 0 means the source is exhausted.
    pub fn read_once<F>(&mut self, read: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        if self.data.capacity() == self.data.len() {
            self.data.reserve(self.data.len() / 8 + 10);
        }
        // safety: the spare capacity is only written by `read`, and only
        // the written prefix is committed below
        let spare: &mut [u8] = unsafe { std::mem::transmute(self.data.chunk_mut()) };
        let n = read(&mut *spare)?;
        debug_assert!(n <= spare.len());
        unsafe { self.data.advance_mut(n) };
        Ok(n)
    }

    /// Drop the first `n` bytes; the remainder keeps its order.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.data.len());
        self.data.advance(n);
    }

    /// Detach the first `n` bytes.
    pub fn split_to(&mut self, n: usize) -> BytesMut {
        assert!(n <= self.data.len());
        self.data.split_to(n)
    }

    /// Forget the contents, shrinking an overgrown backing store.
    pub fn clear(&mut self) {
        self.data.clear();
        self.maybe_shrink();
    }

    /// Shrink an overgrown backing store while keeping the live bytes.
    /// Called between requests on a keep-alive connection.
    pub fn reclaim(&mut self) {
        self.maybe_shrink();
    }

    fn maybe_shrink(&mut self) {
        if self.data.capacity() > self.shrink_threshold {
            let keep = std::mem::replace(&mut self.data, BytesMut::with_capacity(DEFAULT_CAPACITY));
            if !keep.is_empty() {
                self.data.extend_from_slice(&keep);
            }
        }
    }
}

impl Default for Buffer {
    fn default() -> Buffer {
        Buffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buf: &mut Buffer, bytes: &[u8]) {
        let mut src = bytes;
        loop {
            let n = buf
                .read_once(|dst| {
                    let n = dst.len().min(src.len());
                    dst[..n].copy_from_slice(&src[..n]);
                    src = &src[n..];
                    Ok(n)
                })
                .unwrap();
            if n == 0 {
                break;
            }
        }
    }

    #[test]
    fn append_then_read_back() {
        let mut buf = Buffer::new();
        fill(&mut buf, b"hello world");
        assert_eq!(buf.as_slice(), b"hello world");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn consume_drops_exactly_the_prefix() {
        let mut buf = Buffer::new();
        fill(&mut buf, b"abcdefgh");
        let before = buf.as_slice().to_vec();
        for k in [0usize, 3, 2] {
            let expected = buf.as_slice()[k..].to_vec();
            buf.consume(k);
            assert_eq!(buf.as_slice(), &expected[..]);
        }
        assert_eq!(buf.as_slice(), &before[5..]);
    }

    #[test]
    #[should_panic]
    fn consume_past_end_panics() {
        let mut buf = Buffer::new();
        fill(&mut buf, b"ab");
        buf.consume(3);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut buf = Buffer::new();
        let big = vec![0x5au8; DEFAULT_CAPACITY * 3 + 17];
        fill(&mut buf, &big);
        assert_eq!(buf.as_slice(), &big[..]);
    }

    #[test]
    fn clear_shrinks_an_overgrown_store() {
        let mut buf = Buffer::with_shrink_threshold(1024);
        fill(&mut buf, &vec![1u8; 8192]);
        assert!(buf.data.capacity() > 1024);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.data.capacity() <= DEFAULT_CAPACITY);
    }

    #[test]
    fn reclaim_keeps_live_bytes() {
        let mut buf = Buffer::with_shrink_threshold(1024);
        fill(&mut buf, &vec![7u8; 8192]);
        buf.consume(8000);
        buf.reclaim();
        assert_eq!(buf.as_slice(), &[7u8; 192][..]);
    }
}
