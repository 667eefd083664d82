use std::error;
use std::fmt;
use std::io;

/// Failure on the request path.
///
/// `Status` is the in-band arm: it carries the HTTP status code to report
/// and a diagnostic message, and the connection loop converts it into an
/// error response. `Io` is the transport arm: the peer is gone or the
/// socket is broken, so the connection is closed without a reply.
#[derive(Debug)]
pub enum Error {
    Status(u16, String),
    Io(io::Error),
}

impl Error {
    pub fn status(code: u16, message: impl Into<String>) -> Error {
        Error::Status(code, message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Status(code, ref msg) => write!(f, "status {}: {}", code, msg),
            Error::Io(ref err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Status(..) => None,
            Error::Io(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Wrap a `Status` so it can travel through an `io::Read` adapter.
pub(crate) fn to_io(err: Error) -> io::Error {
    match err {
        Error::Io(err) => err,
        err => io::Error::other(err),
    }
}

/// Recover an `Error` smuggled through `to_io`; anything else is transport.
pub(crate) fn from_io(err: io::Error) -> Error {
    if err.get_ref().map_or(true, |inner| !inner.is::<Error>()) {
        return Error::Io(err);
    }
    match err.into_inner() {
        Some(inner) => match inner.downcast::<Error>() {
            Ok(err) => *err,
            Err(inner) => Error::Io(io::Error::other(inner)),
        },
        None => Error::Io(io::Error::other("empty error payload")),
    }
}
