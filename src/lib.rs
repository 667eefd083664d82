//! Minimal, embeddable, blocking HTTP/1.1 origin server.
//!
//! One worker per accepted connection (pluggable spawn strategy, default
//! OS thread), a reusable buffered stream per connection, path-pattern
//! routing with decode/encode hooks, and chunked bodies in both
//! directions.
//!
//! ```no_run
//! use minihttpd::{Method, Response, Server};
//!
//! let mut server = Server::new("127.0.0.1", 8080);
//! server.add_path_handler(Some(Method::Get), "/hello/%s", |params, _req| {
//!     Response::text(format!("hello {}", params.str(0).unwrap_or("?")))
//! });
//! server.run().unwrap();
//! ```

#[macro_use]
extern crate log;

mod buf;
mod config;
mod dbg;
mod error;
mod headers;
mod request;
mod response;
mod route;
mod server;
mod stream;

pub use buf::Buffer;
pub use config::HttpConfig;
pub use dbg::{debug_enabled, set_debug};
pub use error::Error;
pub use headers::{Headers, Method};
pub use request::Request;
pub use response::{status_text, Body, Response};
pub use route::{BoundHandler, MatchOutcome, Params, Pattern, Value};
pub use server::{
    DecodeHook, EncodeHook, Handler, Server, SpawnFn, StopHandle, StreamTransform,
};
pub use stream::{ChunkedReader, InputStream};
