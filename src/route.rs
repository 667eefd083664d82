use std::sync::Arc;

use bytes::Bytes;

use crate::headers::Method;
use crate::request::Request;
use crate::response::Response;

/// Scan-style path pattern, e.g. `/user/%s/file/%d`.
///
/// The pattern is split on `/`; a `%s` segment binds one path segment as a
/// string, a `%d` segment binds one integer segment, and anything else
/// must match literally. A pattern matches iff the whole path is consumed
/// and every declared parameter binds.
#[derive(Debug, Clone)]
pub struct Pattern {
    segs: Vec<Seg>,
}

#[derive(Debug, Clone)]
enum Seg {
    Lit(String),
    Str,
    Int,
}

impl Pattern {
    pub fn parse(pattern: &str) -> Pattern {
        let segs = pattern
            .split('/')
            .map(|seg| match seg {
                "%s" => Seg::Str,
                "%d" => Seg::Int,
                lit => Seg::Lit(lit.to_string()),
            })
            .collect();
        Pattern { segs }
    }

    /// Match `path` against the pattern, binding parameters in order.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut values = Vec::new();
        let mut segs = self.segs.iter();
        let mut parts = path.split('/');
        loop {
            match (segs.next(), parts.next()) {
                (None, None) => return Some(Params(values)),
                (Some(seg), Some(part)) => match seg {
                    Seg::Lit(lit) => {
                        if lit != part {
                            return None;
                        }
                    }
                    Seg::Str => values.push(Value::Str(part.to_string())),
                    Seg::Int => values.push(Value::Int(part.parse().ok()?)),
                },
                _ => return None,
            }
        }
    }
}

/// A value bound by a pattern parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
}

/// Parameters bound by a successful pattern match, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<Value>);

impl Params {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.0.get(i)
    }

    pub fn str(&self, i: usize) -> Option<&str> {
        match self.0.get(i) {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, i: usize) -> Option<i64> {
        match self.0.get(i) {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Per-request handler with its pattern parameters already bound.
pub type BoundHandler = Box<dyn FnOnce(Request<Bytes>) -> Response + Send>;

/// What a path entry says about a request.
pub enum MatchOutcome {
    /// Not this entry's request; keep scanning.
    Decline,
    /// This entry takes the request.
    Accept(BoundHandler),
    /// This entry owns the route but refuses the request.
    Reject(u16, String),
}

pub(crate) type BuilderFn = dyn Fn(Params, Request<Bytes>) -> Response + Send + Sync;
pub(crate) type AcceptFn = dyn Fn(&Request<()>) -> Result<(), (u16, String)> + Send + Sync;

/// One registered path handler: method filter, pattern, handler builder
/// and the optional pre-body `accept` predicate.
pub(crate) struct PathEntry {
    pub(crate) method: Option<Method>,
    pub(crate) pattern: Pattern,
    pub(crate) build: Arc<BuilderFn>,
    pub(crate) accept: Option<Arc<AcceptFn>>,
}

impl PathEntry {
    pub(crate) fn try_match(&self, req: &Request<()>) -> MatchOutcome {
        if let Some(method) = self.method {
            if method != req.method {
                return MatchOutcome::Decline;
            }
        }
        let params = match self.pattern.matches(&req.path) {
            Some(params) => params,
            None => return MatchOutcome::Decline,
        };
        if let Some(accept) = &self.accept {
            if let Err((code, msg)) = accept(req) {
                return MatchOutcome::Reject(code, msg);
            }
        }
        let build = Arc::clone(&self.build);
        MatchOutcome::Accept(Box::new(move |req| build(params, req)))
    }
}
