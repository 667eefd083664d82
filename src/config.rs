use std::time::Duration;

use crate::buf;

/// Configuration for HTTP server behavior
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Cap on a materialised request body; exceeding it is a 413.
    pub max_body_size: Option<usize>,
    /// Maximum number of header lines to accept per request.
    pub max_headers: usize,
    /// Connection buffers grown past this are shrunk between requests.
    pub buf_shrink_threshold: usize,
    /// Socket read timeout; a timed-out read closes the connection.
    pub read_timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_size: None,
            max_headers: 1024,
            buf_shrink_threshold: buf::SHRINK_THRESHOLD,
            read_timeout: None,
        }
    }
}

impl HttpConfig {
    /// Create a new HTTP configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum request body size
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = Some(max_body_size);
        self
    }

    /// Set the maximum number of headers
    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    /// Set the buffer shrink threshold
    pub fn with_buf_shrink_threshold(mut self, threshold: usize) -> Self {
        self.buf_shrink_threshold = threshold;
        self
    }

    /// Set the socket read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}
