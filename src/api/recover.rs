//! Panic Recovery
//!
//! A process-level panic hook captures the backtrace when a handler panics,
//! logs it together with a 64-bit FNV-1a hash of the stack, and parks the
//! hash in a thread local. The catch-panic layer then answers
//! `500 Internal server error <hash>`, so operators can grep the logs for
//! the hash printed to the client.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::sync::Once;

use axum::body::Body;
use axum::http::{Response, StatusCode};

thread_local! {
    static LAST_PANIC_HASH: Cell<u64> = const { Cell::new(0) };
}

static INSTALL: Once = Once::new();

/// 64-bit FNV-1a.
pub fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    hash
}

/// Installs the capturing panic hook, once per process. The previous hook is
/// replaced; everything it printed is logged through tracing instead.
pub fn install_panic_capture() {
    INSTALL.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let backtrace = Backtrace::force_capture().to_string();
            let hash = fnv1a(backtrace.as_bytes());
            LAST_PANIC_HASH.set(hash);
            tracing::error!("panic: {info} (code {hash})\n{backtrace}");
        }));
    });
}

/// Builds the 500 response for a caught panic. Unwinding resumes on the
/// thread that panicked, so the thread-local hash written by the hook is the
/// one belonging to this panic.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let hash = match LAST_PANIC_HASH.replace(0) {
        0 => fnv1a(panic_message(payload.as_ref()).as_bytes()),
        hash => hash,
    };

    let mut resp = Response::new(Body::from(format!("Internal server error {hash}")));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
