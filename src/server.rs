use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;

use crate::buf::Buffer;
use crate::config::HttpConfig;
use crate::dbg::trace_dbg;
use crate::error::Error;
use crate::headers::Method;
use crate::request::{self, Request};
use crate::response::Response;
use crate::route::{MatchOutcome, Params, PathEntry, Pattern};
use crate::stream::InputStream;

/// Top-level request handler.
pub type Handler = Box<dyn Fn(Request<Bytes>) -> Response + Send + Sync>;

/// Wraps the body's byte stream before framing is applied; produced per
/// request by a decode hook.
pub type StreamTransform = Box<dyn for<'a> FnOnce(Box<dyn Read + 'a>) -> Box<dyn Read + 'a>>;

/// Request-decoder hook: runs on the unit-bodied request before the body
/// is read; may rewrite the request and wrap its byte stream. `None`
/// leaves the stream alone.
pub type DecodeHook = Box<dyn Fn(&mut Request<()>) -> Option<StreamTransform> + Send + Sync>;

/// Response-encoder hook: observes the request and may rewrite the
/// response before it is written.
pub type EncodeHook = Box<dyn Fn(&Request<Bytes>, &mut Response) + Send + Sync>;

/// Runs one connection worker; the default spawns an OS thread.
pub type SpawnFn = Box<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// A blocking HTTP/1.1 origin server.
///
/// Configure handlers and hooks first, then call [`run`](Server::run)
/// (or [`serve`](Server::serve) with a pre-bound listener); both consume
/// the server, so the registration lists are frozen from then on. Take a
/// [`StopHandle`] beforehand to stop it: workers observe the flag between
/// requests, and the accept loop checks it before handling the next
/// connection.
pub struct Server {
    addr: String,
    port: u16,
    spawn: SpawnFn,
    mask_sigpipe: bool,
    shared: Shared,
}

/// The part of the server every connection worker sees.
struct Shared {
    config: HttpConfig,
    top_handler: Handler,
    path_handlers: Vec<PathEntry>,
    decoders: Vec<DecodeHook>,
    encoders: Vec<EncodeHook>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag of the server it was taken from.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl Server {
    pub fn new(addr: impl Into<String>, port: u16) -> Server {
        Server {
            addr: addr.into(),
            port,
            spawn: Box::new(|work| {
                thread::spawn(work);
            }),
            mask_sigpipe: true,
            shared: Shared {
                config: HttpConfig::default(),
                top_handler: Box::new(|req| {
                    Response::fail(404, format!("no handler for path {:?}", req.path))
                }),
                path_handlers: Vec::new(),
                decoders: Vec::new(),
                encoders: Vec::new(),
                running: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// Replace the connection-worker spawn strategy.
    pub fn with_spawn(
        mut self,
        spawn: impl Fn(Box<dyn FnOnce() + Send>) + Send + Sync + 'static,
    ) -> Server {
        self.spawn = Box::new(spawn);
        self
    }

    /// Whether `SIGPIPE` is masked when the server starts (default on).
    pub fn with_mask_sigpipe(mut self, on: bool) -> Server {
        self.mask_sigpipe = on;
        self
    }

    pub fn with_config(mut self, config: HttpConfig) -> Server {
        self.shared.config = config;
        self
    }

    /// Fallback handler for requests no path handler takes.
    pub fn set_top_handler(
        &mut self,
        handler: impl Fn(Request<Bytes>) -> Response + Send + Sync + 'static,
    ) {
        self.shared.top_handler = Box::new(handler);
    }

    /// Register a path handler. Entries are scanned most-recent first, so
    /// a later registration shadows an earlier one for the same paths.
    pub fn add_path_handler(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        build: impl Fn(Params, Request<Bytes>) -> Response + Send + Sync + 'static,
    ) {
        self.insert_path_entry(method, pattern, Arc::new(build), None);
    }

    /// Like [`add_path_handler`](Server::add_path_handler), with an
    /// `accept` predicate that inspects the raw request before the body
    /// is read and may refuse it with a status.
    pub fn add_path_handler_checked(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        build: impl Fn(Params, Request<Bytes>) -> Response + Send + Sync + 'static,
        accept: impl Fn(&Request<()>) -> Result<(), (u16, String)> + Send + Sync + 'static,
    ) {
        self.insert_path_entry(method, pattern, Arc::new(build), Some(Arc::new(accept)));
    }

    fn insert_path_entry(
        &mut self,
        method: Option<Method>,
        pattern: &str,
        build: Arc<crate::route::BuilderFn>,
        accept: Option<Arc<crate::route::AcceptFn>>,
    ) {
        self.shared.path_handlers.insert(
            0,
            PathEntry {
                method,
                pattern: Pattern::parse(pattern),
                build,
                accept,
            },
        );
    }

    pub fn add_decode_request_cb(
        &mut self,
        cb: impl Fn(&mut Request<()>) -> Option<StreamTransform> + Send + Sync + 'static,
    ) {
        self.shared.decoders.push(Box::new(cb));
    }

    pub fn add_encode_response_cb(
        &mut self,
        cb: impl Fn(&Request<Bytes>, &mut Response) + Send + Sync + 'static,
    ) {
        self.shared.encoders.push(Box::new(cb));
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.shared.running))
    }

    /// Bind the configured address and serve until stopped.
    pub fn run(self) -> io::Result<()> {
        let listener = TcpListener::bind((self.addr.as_str(), self.port))?;
        self.serve(listener)
    }

    /// Serve connections accepted from `listener` until stopped.
    pub fn serve(self, listener: TcpListener) -> io::Result<()> {
        if self.mask_sigpipe {
            mask_sigpipe();
        }
        let Server { spawn, shared, .. } = self;
        shared.running.store(true, Ordering::Relaxed);
        let shared = Arc::new(shared);
        if let Ok(addr) = listener.local_addr() {
            info!("listening on {}", addr);
        }
        for conn in listener.incoming() {
            if !shared.running.load(Ordering::Relaxed) {
                break;
            }
            match conn {
                Ok(sock) => {
                    let shared = Arc::clone(&shared);
                    spawn(Box::new(move || serve_connection(&shared, sock)));
                }
                Err(e) => error!("accept failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Peer disconnect during a write becomes an ordinary `EPIPE` error.
#[cfg(unix)]
fn mask_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn mask_sigpipe() {}

fn serve_connection(shared: &Shared, sock: TcpStream) {
    if let Some(timeout) = shared.config.read_timeout {
        let _ = sock.set_read_timeout(Some(timeout));
    }
    match sock.peer_addr() {
        Ok(peer) => trace_dbg!("connection from {}", peer),
        Err(_) => trace_dbg!("connection from unknown peer"),
    }
    serve_io(shared, sock);
    trace_dbg!("connection closed");
}

/// Serve requests off one connection until it closes. The socket is
/// dropped, and thereby closed, on return.
fn serve_io<S: Read + Write>(shared: &Shared, sock: S) {
    let buf = Buffer::with_shrink_threshold(shared.config.buf_shrink_threshold);
    let mut stream = InputStream::with_buffer(sock, buf);
    while shared.running.load(Ordering::Relaxed) {
        match serve_one(shared, &mut stream) {
            Flow::Continue => stream.reclaim(),
            Flow::Close => break,
        }
    }
}

enum Flow {
    Continue,
    Close,
}

/// One request/response exchange, per the dispatch pipeline: select a
/// handler, honor `Expect`, fold the decode hooks over the byte stream,
/// read the body, invoke the handler, fold the encode hooks, write.
fn serve_one<S: Read + Write>(shared: &Shared, stream: &mut InputStream<S>) -> Flow {
    let mut req = match request::parse_start(stream, shared.config.max_headers) {
        Ok(None) => return Flow::Close,
        Ok(Some(req)) => req,
        Err(Error::Io(e)) => {
            debug!("transport error reading request start: {}", e);
            return Flow::Close;
        }
        Err(Error::Status(code, msg)) => {
            debug!("malformed request start: {} {}", code, msg);
            let _ = Response::fail(code, msg).write_to(stream.get_mut());
            return Flow::Close;
        }
    };
    trace_dbg!("request {} {}", req.method, req.path);

    let selected = match select_handler(shared, &req) {
        Ok(selected) => selected,
        Err((code, msg)) => {
            // refused before the body was read; the framing is unknown
            let _ = Response::fail(code, msg).write_to(stream.get_mut());
            return Flow::Close;
        }
    };

    if let Some(expect) = req.headers.get("Expect") {
        let expect = expect.trim();
        if expect == "100-continue" {
            trace_dbg!("answering 100 Continue");
            let w = stream.get_mut();
            let sent = w
                .write_all(b"HTTP/1.1 100 Continue\r\n\r\n")
                .and_then(|_| w.flush());
            if sent.is_err() {
                return Flow::Close;
            }
        } else {
            let msg = format!("unknown expectation {:?}", expect);
            let _ = Response::fail(417, msg).write_to(stream.get_mut());
            return Flow::Close;
        }
    }

    let mut transforms: Vec<StreamTransform> = Vec::new();
    for hook in &shared.decoders {
        if let Some(transform) = hook(&mut req) {
            transforms.push(transform);
        }
    }

    let body = {
        // earliest-registered transform ends up closest to the socket
        let raw: Box<dyn Read + '_> = Box::new(&mut *stream);
        let src = transforms.into_iter().fold(raw, |s, t| t(s));
        request::read_body(&req, src, shared.config.max_body_size)
    };
    let body = match body {
        Ok(body) => body,
        Err(Error::Io(e)) => {
            debug!("transport error reading body: {}", e);
            return Flow::Close;
        }
        Err(Error::Status(code, msg)) => {
            debug!("bad body: {} {}", code, msg);
            let _ = Response::fail(code, msg).write_to(stream.get_mut());
            return Flow::Close;
        }
    };
    let req = req.with_body(body);

    let req_view = req.clone();
    let mut resp = match panic::catch_unwind(AssertUnwindSafe(move || selected.call(req))) {
        Ok(resp) => resp,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!("handler panicked: {}", msg);
            Response::fail(500, format!("handler panicked: {}", msg))
        }
    };

    for hook in &shared.encoders {
        hook(&req_view, &mut resp);
    }

    trace_dbg!("response {}", resp.status);
    if let Err(e) = resp.write_to(stream.get_mut()) {
        debug!("transport error writing response: {}", e);
        return Flow::Close;
    }

    if wants_close(&req_view) {
        return Flow::Close;
    }
    Flow::Continue
}

enum Selected<'a> {
    Bound(crate::route::BoundHandler),
    Top(&'a Handler),
}

impl Selected<'_> {
    fn call(self, req: Request<Bytes>) -> Response {
        match self {
            Selected::Bound(handler) => handler(req),
            Selected::Top(handler) => handler(req),
        }
    }
}

fn select_handler<'a>(
    shared: &'a Shared,
    req: &Request<()>,
) -> Result<Selected<'a>, (u16, String)> {
    for entry in &shared.path_handlers {
        match entry.try_match(req) {
            MatchOutcome::Decline => continue,
            MatchOutcome::Accept(handler) => return Ok(Selected::Bound(handler)),
            MatchOutcome::Reject(code, msg) => return Err((code, msg)),
        }
    }
    Ok(Selected::Top(&shared.top_handler))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

fn wants_close(req: &Request<Bytes>) -> bool {
    req.headers
        .get("Connection")
        .map(|v| v.trim().eq_ignore_ascii_case("close"))
        .unwrap_or(false)
}
