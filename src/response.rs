use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};

use crate::headers::Headers;
use crate::stream::write_chunked;

/// Response payload: either text of known length or a stream of unknown
/// length that goes out chunked.
pub enum Body {
    Text(String),
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Body::Text(ref s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Body::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// An HTTP response, written to the wire exactly once.
///
/// Constructors set the framing header themselves: a text body carries its
/// exact `Content-Length`, a stream body carries `Transfer-Encoding:
/// chunked`. A response never carries both.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Body,
}

impl Response {
    /// Response with a fixed body and its exact `Content-Length`.
    pub fn new(status: u16, body: impl Into<String>) -> Response {
        let body = body.into();
        let mut headers = Headers::new();
        headers.set("Content-Length", body.len().to_string());
        Response {
            status,
            headers,
            body: Body::Text(body),
        }
    }

    /// 200 with a text body.
    pub fn text(body: impl Into<String>) -> Response {
        Response::new(200, body)
    }

    /// Failure response; the message becomes the body.
    pub fn fail(status: u16, message: impl Into<String>) -> Response {
        Response::new(status, message)
    }

    /// Response streaming a body of unknown length as chunks.
    pub fn stream(status: u16, body: impl Read + Send + 'static) -> Response {
        let mut headers = Headers::new();
        headers.set("Transfer-Encoding", "chunked");
        Response {
            status,
            headers,
            body: Body::Stream(Box::new(body)),
        }
    }

    /// Add a header, replacing earlier ones of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Response {
        self.headers.set(name, value);
        self
    }

    /// Emit the response and flush. Consumes the response; a stream body
    /// can only be read out once.
    pub(crate) fn write_to<W: Write>(self, w: &mut W) -> io::Result<()> {
        let mut itoa_buf = itoa::Buffer::new();
        w.write_all(b"HTTP/1.1 ")?;
        w.write_all(itoa_buf.format(self.status).as_bytes())?;
        w.write_all(b" ")?;
        w.write_all(status_text(self.status).as_bytes())?;
        w.write_all(b"\r\n")?;
        for (name, value) in &self.headers {
            w.write_all(name.as_bytes())?;
            w.write_all(b": ")?;
            w.write_all(value.as_bytes())?;
            w.write_all(b"\r\n")?;
        }
        w.write_all(b"\r\n")?;
        match self.body {
            Body::Text(s) => {
                if !s.is_empty() {
                    w.write_all(s.as_bytes())?;
                }
            }
            Body::Stream(mut r) => write_chunked(&mut r, w)?,
        }
        w.flush()
    }
}

/// Description of a response code, as it appears on the status line.
pub fn status_text(code: u16) -> Cow<'static, str> {
    let text = match code {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No content",
        300 => "Multiple choices",
        301 => "Moved permanently",
        302 => "Found",
        400 => "Bad request",
        403 => "Forbidden",
        404 => "Not found",
        405 => "Method not allowed",
        408 => "Request timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length required",
        413 => "Payload too large",
        417 => "Expectation failed",
        500 => "Internal server error",
        501 => "Not implemented",
        503 => "Service unavailable",
        n => return Cow::Owned(format!("Unknown response code {}", n)),
    };
    Cow::Borrowed(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(resp: Response) -> Vec<u8> {
        let mut out = Vec::new();
        resp.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn status_descriptions_are_verbatim() {
        assert_eq!(status_text(200), "OK");
        assert_eq!(status_text(204), "No content");
        assert_eq!(status_text(301), "Moved permanently");
        assert_eq!(status_text(413), "Payload too large");
        assert_eq!(status_text(417), "Expectation failed");
        assert_eq!(status_text(999), "Unknown response code 999");
    }

    #[test]
    fn text_response_wire_format() {
        assert_eq!(
            wire(Response::text("hi")),
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi"
        );
    }

    #[test]
    fn empty_body_still_declares_its_length() {
        assert_eq!(
            wire(Response::new(204, "")),
            b"HTTP/1.1 204 No content\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn headers_keep_insertion_order() {
        let resp = Response::text("x")
            .with_header("B-Second", "2")
            .with_header("A-First", "1");
        let out = wire(resp);
        let text = String::from_utf8(out).unwrap();
        // set() prepends, so the most recently set header comes first
        assert!(text.starts_with(
            "HTTP/1.1 200 OK\r\nA-First: 1\r\nB-Second: 2\r\nContent-Length: 1\r\n\r\n"
        ));
    }

    #[test]
    fn stream_body_goes_out_chunked() {
        let resp = Response::stream(200, &b"hello world"[..]);
        assert_eq!(resp.headers.get("Transfer-Encoding"), Some("chunked"));
        assert!(!resp.headers.contains("Content-Length"));
        let out = wire(resp);
        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nb\r\nhello world\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn fail_carries_message_as_body() {
        let out = wire(Response::fail(404, "no such page"));
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not found\r\n"));
        assert!(text.ends_with("\r\n\r\nno such page"));
    }
}
