use std::borrow::Cow;
use std::io::{self, Read};

use bytes::Bytes;

use crate::error::{self, Error};
use crate::headers::{Headers, Method};
use crate::stream::{ChunkedReader, InputStream};

/// An HTTP request, parameterised by its body.
///
/// The parser produces a unit-bodied `Request<()>` once the request line
/// and headers are in; after the framing layer has materialised the body
/// it becomes a `Request<Bytes>` and is handed to exactly one handler.
/// The path is kept raw, not URL-decoded.
#[derive(Debug, Clone)]
pub struct Request<B> {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    pub body: B,
}

impl<B> Request<B> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub(crate) fn with_body<C>(self, body: C) -> Request<C> {
        Request {
            method: self.method,
            path: self.path,
            headers: self.headers,
            body,
        }
    }

    fn content_length(&self) -> Result<usize, Error> {
        match self.headers.get("Content-Length") {
            None => Ok(0),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::status(400, format!("invalid Content-Length {:?}", v))),
        }
    }
}

impl Request<Bytes> {
    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Read and parse the request line and header block.
///
/// `Ok(None)` is a clean end of input before any byte of a new request;
/// `Err(Error::Io(_))` is a transport failure; `Err(Error::Status(..))`
/// carries the HTTP status to answer with.
pub(crate) fn parse_start<R: Read>(
    stream: &mut InputStream<R>,
    max_headers: usize,
) -> Result<Option<Request<()>>, Error> {
    let line = stream.read_line()?;
    if line.is_empty() {
        return Ok(None);
    }
    let (method, path) = parse_request_line(&line)?;
    let mut headers = Headers::new();
    loop {
        let line = stream.read_line()?;
        if line == "\r" {
            break;
        }
        if line.is_empty() {
            // end of input in the middle of the header block
            return Err(Error::status(400, "Invalid header line"));
        }
        let raw = line.strip_suffix('\r').unwrap_or(&line);
        let (name, value) = parse_header_line(raw)?;
        headers.push(name, value);
        if headers.len() > max_headers {
            return Err(Error::status(400, "too many headers"));
        }
    }
    Ok(Some(Request {
        method,
        path,
        headers,
        body: (),
    }))
}

/// `METHOD SP PATH SP HTTP/1.1`, nothing more.
fn parse_request_line(line: &str) -> Result<(Method, String), Error> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut tokens = line.split(' ');
    match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(path), Some(version), None) if !path.is_empty() => {
            let method = Method::from_token(method)
                .ok_or_else(|| Error::status(400, format!("unknown method {:?}", method)))?;
            if version != "HTTP/1.1" {
                return Err(Error::status(400, "Invalid request line"));
            }
            Ok((method, path.to_string()))
        }
        _ => Err(Error::status(400, "Invalid request line")),
    }
}

/// `NAME: VALUE` with a single space after the colon.
fn parse_header_line(raw: &str) -> Result<(&str, &str), Error> {
    let bad = || Error::status(400, format!("Invalid header line {:?}", raw));
    let (name, rest) = raw.split_once(':').ok_or_else(bad)?;
    let value = rest.strip_prefix(' ').ok_or_else(bad)?;
    if name.is_empty() {
        return Err(bad());
    }
    Ok((name, value))
}

/// Materialise the body of `req` from `src`, which is the (possibly
/// hook-transformed) connection stream positioned right after the header
/// block. Framing is `Content-Length` (absent means empty) or
/// `Transfer-Encoding: chunked`; any other transfer encoding is refused.
pub(crate) fn read_body<R: Read>(
    req: &Request<()>,
    src: R,
    max_size: Option<usize>,
) -> Result<Bytes, Error> {
    if let Some(te) = req.headers.get("Transfer-Encoding") {
        let te = te.trim();
        if !te.eq_ignore_ascii_case("chunked") {
            return Err(Error::status(
                500,
                format!("cannot handle transfer encoding: {}", te),
            ));
        }
        return read_capped(&mut ChunkedReader::new(src), max_size);
    }
    let n = req.content_length()?;
    if let Some(cap) = max_size {
        if n > cap {
            return Err(too_large(cap, n));
        }
    }
    if n == 0 {
        return Ok(Bytes::new());
    }
    let mut stream = InputStream::new(src);
    match stream.read_exact_n(n) {
        Ok(body) => Ok(body.into()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::status(400, "body is too short"))
        }
        Err(e) => Err(error::from_io(e)),
    }
}

fn read_capped<R: Read>(src: &mut R, max_size: Option<usize>) -> Result<Bytes, Error> {
    let mut out = Vec::new();
    match max_size {
        None => {
            src.read_to_end(&mut out).map_err(error::from_io)?;
        }
        Some(cap) => {
            src.take(cap as u64 + 1)
                .read_to_end(&mut out)
                .map_err(error::from_io)?;
            if out.len() > cap {
                return Err(too_large(cap, out.len()));
            }
        }
    }
    Ok(out.into())
}

fn too_large(cap: usize, got: usize) -> Error {
    Error::status(
        413,
        format!(
            "content size exceeds maximum allowed size: at most {} bytes expected, got at least {}",
            cap, got
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(input: &[u8]) -> Result<Option<Request<()>>, Error> {
        parse_start(&mut InputStream::new(input), 1024)
    }

    fn status_of(err: Error) -> (u16, String) {
        match err {
            Error::Status(code, msg) => (code, msg),
            other => panic!("expected a status error, got {:?}", other),
        }
    }

    #[test]
    fn parses_a_minimal_request() {
        let req = start(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/hello");
        assert_eq!(req.header("Host"), Some("x"));
    }

    #[test]
    fn empty_input_is_a_clean_eof() {
        assert!(start(b"").unwrap().is_none());
    }

    #[test]
    fn unknown_method_has_its_own_message() {
        let (code, msg) = status_of(start(b"FROB / HTTP/1.1\r\n\r\n").unwrap_err());
        assert_eq!(code, 400);
        assert_eq!(msg, "unknown method \"FROB\"");
    }

    #[test]
    fn garbled_request_lines_are_400() {
        for input in [
            &b"GET /\r\n\r\n"[..],
            &b"GET / HTTP/1.0\r\n\r\n"[..],
            &b"GET  / HTTP/1.1\r\n\r\n"[..],
            &b"GET / HTTP/1.1 extra\r\n\r\n"[..],
            &b"partial"[..],
        ] {
            let (code, msg) = status_of(start(input).unwrap_err());
            assert_eq!(code, 400);
            assert_eq!(msg, "Invalid request line");
        }
    }

    #[test]
    fn header_without_colon_or_space_is_400() {
        for input in [
            &b"GET / HTTP/1.1\r\nbroken\r\n\r\n"[..],
            &b"GET / HTTP/1.1\r\nName:tight\r\n\r\n"[..],
            &b"GET / HTTP/1.1\r\n: empty\r\n\r\n"[..],
        ] {
            let (code, _) = status_of(start(input).unwrap_err());
            assert_eq!(code, 400);
        }
    }

    #[test]
    fn truncated_header_block_is_400() {
        let (code, _) = status_of(start(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap_err());
        assert_eq!(code, 400);
    }

    #[test]
    fn duplicate_headers_are_kept_in_order() {
        let req = start(b"GET / HTTP/1.1\r\nA: 1\r\nA: 2\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.header("A"), Some("1"));
    }

    #[test]
    fn header_count_cap_is_enforced() {
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..5 {
            input.extend_from_slice(format!("H{}: v\r\n", i).as_bytes());
        }
        input.extend_from_slice(b"\r\n");
        let err = parse_start(&mut InputStream::new(&input[..]), 4).unwrap_err();
        let (code, msg) = status_of(err);
        assert_eq!((code, msg.as_str()), (400, "too many headers"));
    }

    fn unit_req(headers: &[(&str, &str)]) -> Request<()> {
        let mut h = Headers::new();
        for (k, v) in headers {
            h.push(*k, *v);
        }
        Request {
            method: Method::Post,
            path: "/".into(),
            headers: h,
            body: (),
        }
    }

    #[test]
    fn fixed_length_body_is_the_identity() {
        let req = unit_req(&[("Content-Length", "5")]);
        let body = read_body(&req, &b"hello and trailing"[..], None).unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[test]
    fn missing_content_length_means_empty_body() {
        let req = unit_req(&[]);
        let body = read_body(&req, &b"ignored"[..], None).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn malformed_content_length_is_400() {
        let req = unit_req(&[("Content-Length", "five")]);
        let (code, _) = status_of(read_body(&req, &b""[..], None).unwrap_err());
        assert_eq!(code, 400);
    }

    #[test]
    fn short_fixed_body_is_400() {
        let req = unit_req(&[("Content-Length", "10")]);
        let (code, msg) = status_of(read_body(&req, &b"only4"[..], None).unwrap_err());
        assert_eq!((code, msg.as_str()), (400, "body is too short"));
    }

    #[test]
    fn chunked_body_is_decoded() {
        let req = unit_req(&[("Transfer-Encoding", " chunked ")]);
        let wire = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let body = read_body(&req, &wire[..], None).unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[test]
    fn other_transfer_encodings_are_500() {
        let req = unit_req(&[("Transfer-Encoding", "gzip")]);
        let (code, msg) = status_of(read_body(&req, &b""[..], None).unwrap_err());
        assert_eq!(code, 500);
        assert!(msg.contains("cannot handle transfer encoding"));
        assert!(msg.contains("gzip"));
    }

    #[test]
    fn oversize_chunked_body_is_413_naming_cap_and_size() {
        let req = unit_req(&[("Transfer-Encoding", "chunked")]);
        let wire = b"c\r\nhello world!\r\n0\r\n\r\n";
        let (code, msg) = status_of(read_body(&req, &wire[..], Some(10)).unwrap_err());
        assert_eq!(code, 413);
        assert!(msg.contains("10"), "cap missing from {:?}", msg);
        assert!(msg.contains("11"), "observed size missing from {:?}", msg);
    }

    #[test]
    fn oversize_declared_length_is_413() {
        let req = unit_req(&[("Content-Length", "100")]);
        let (code, _) = status_of(read_body(&req, &b""[..], Some(10)).unwrap_err());
        assert_eq!(code, 413);
    }
}
