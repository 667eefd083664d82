//! Verbose per-thread tracing, toggled by the `HTTP_DBG` environment
//! variable (empty or unset means off) or at runtime via [`set_debug`].

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

static DEBUG: Lazy<AtomicBool> = Lazy::new(|| {
    AtomicBool::new(matches!(env::var("HTTP_DBG"), Ok(v) if !v.is_empty()))
});

/// Whether verbose tracing is on.
pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Toggle verbose tracing at runtime. No ordering guarantees; other
/// threads pick the change up on their next trace point.
pub fn set_debug(on: bool) {
    DEBUG.store(on, Ordering::Relaxed);
}

/// Stderr trace line tagged with the current thread, emitted only when
/// the debug flag is on.
macro_rules! trace_dbg {
    ($($arg:tt)*) => {
        if $crate::dbg::debug_enabled() {
            eprintln!("[{:?}] {}", std::thread::current().id(), format_args!($($arg)*));
        }
    };
}

pub(crate) use trace_dbg;
