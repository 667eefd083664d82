use std::io::{self, Read, Write};

use crate::buf::Buffer;
use crate::error::{self, Error};

/// Buffered reader over an arbitrary byte source.
///
/// One instance lives for the whole connection and owns the reusable
/// [`Buffer`]; the same line-oriented helpers also serve in-memory sources
/// (`&[u8]`, `Cursor`) in tests and body adapters.
pub struct InputStream<R> {
    src: R,
    buf: Buffer,
}

impl<R: Read> InputStream<R> {
    pub fn new(src: R) -> InputStream<R> {
        InputStream::with_buffer(src, Buffer::new())
    }

    pub fn with_buffer(src: R, buf: Buffer) -> InputStream<R> {
        InputStream { src, buf }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.src
    }

    /// Bytes read from the source but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Shrink the buffer's backing store if a large request left it
    /// overgrown. Called between requests on a keep-alive connection.
    pub fn reclaim(&mut self) {
        self.buf.reclaim();
    }

    fn fill(&mut self) -> io::Result<usize> {
        let InputStream { src, buf } = self;
        buf.read_once(|dst| src.read(dst))
    }

    /// Read up to and including the next `\n`.
    ///
    /// The returned line excludes the `\n` but keeps a trailing `\r`, so
    /// callers strip exactly one `\r` to get the logical line. At end of
    /// input, any partial buffered data is returned as-is; an empty string
    /// means the source is exhausted.
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf.as_slice()[scanned..].iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(scanned + pos + 1);
                return Ok(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
            }
            scanned = self.buf.len();
            if self.fill()? == 0 {
                let rest = self.buf.split_to(self.buf.len());
                return Ok(String::from_utf8_lossy(&rest).into_owned());
            }
        }
    }

    /// Take exactly `n` bytes, reading until the buffer holds at least
    /// that many. A source that ends early is `UnexpectedEof`.
    pub fn read_exact_n(&mut self, n: usize) -> io::Result<Vec<u8>> {
        while self.buf.len() < n {
            if self.fill()? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", n, self.buf.len()),
                ));
            }
        }
        Ok(self.buf.split_to(n).to_vec())
    }

    /// Drain the source to its end and return everything.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        while self.fill()? != 0 {}
        let all = self.buf.split_to(self.buf.len()).to_vec();
        self.buf.clear();
        Ok(all)
    }
}

/// Drains the buffered bytes first, then reads straight from the source.
impl<R: Read> Read for InputStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if !self.buf.is_empty() {
            let n = out.len().min(self.buf.len());
            out[..n].copy_from_slice(&self.buf.as_slice()[..n]);
            self.buf.consume(n);
            return Ok(n);
        }
        if out.is_empty() {
            return Ok(0);
        }
        self.src.read(out)
    }
}

/// Decodes a `Transfer-Encoding: chunked` body into the raw payload.
///
/// Presents itself as an ordinary stream: `read` hands out bytes of the
/// current chunk, refills at chunk boundaries, and returns 0 once the
/// terminator chunk has been consumed.
pub struct ChunkedReader<R> {
    src: InputStream<R>,
    /// Payload bytes left in the current chunk.
    remaining: usize,
    /// A chunk payload was finished and its CRLF not yet consumed.
    needs_sep: bool,
    done: bool,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(src: R) -> ChunkedReader<R> {
        ChunkedReader {
            src: InputStream::new(src),
            remaining: 0,
            needs_sep: false,
            done: false,
        }
    }

    fn next_chunk(&mut self) -> io::Result<()> {
        if self.needs_sep {
            // CRLF that closes the previous chunk's payload
            let sep = self.src.read_line()?;
            if !(sep.is_empty() || sep == "\r") {
                return Err(error::to_io(Error::status(400, "invalid chunk")));
            }
            self.needs_sep = false;
        }
        let line = self.src.read_line()?;
        let size = parse_chunk_size(&line).map_err(error::to_io)?;
        if size == 0 {
            // line terminator of the last chunk; trailers are not supported
            let _ = self.src.read_line()?;
            self.done = true;
        } else {
            self.remaining = size;
            self.needs_sep = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.done {
                return Ok(0);
            }
            if self.remaining == 0 {
                self.next_chunk()?;
                continue;
            }
            let want = out.len().min(self.remaining);
            let n = self.src.read(&mut out[..want])?;
            if n == 0 {
                return Err(error::to_io(Error::status(400, "chunk is too short")));
            }
            self.remaining -= n;
            return Ok(n);
        }
    }
}

/// Parse a chunk-size line: hexadecimal size, optionally followed by
/// extensions after a space or `;`, with the trailing `\r` still attached.
fn parse_chunk_size(line: &str) -> Result<usize, Error> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let size = line.split(|c| c == ' ' || c == ';').next().unwrap_or("");
    usize::from_str_radix(size, 16)
        .map_err(|_| Error::status(400, format!("invalid chunk size {:?}", line)))
}

/// Outbound half of the chunked framing: emit `r` as `SIZE-hex\r\n<bytes>\r\n`
/// chunks sized by the reads, then the terminal `0\r\n\r\n`.
pub(crate) fn write_chunked<R: Read, W: Write>(r: &mut R, w: &mut W) -> io::Result<()> {
    let mut chunk = [0u8; 4096];
    loop {
        let n = r.read(&mut chunk)?;
        if n == 0 {
            w.write_all(b"0\r\n\r\n")?;
            return Ok(());
        }
        write!(w, "{:x}\r\n", n)?;
        w.write_all(&chunk[..n])?;
        w.write_all(b"\r\n")?;
    }
}
