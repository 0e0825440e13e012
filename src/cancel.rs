//! Cooperative cancellation for long-running requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation capability polled by the series engine.
///
/// The engine checks the token once per interval consumed from the store
/// query and once per sample timestamp, and returns a cancelled result
/// promptly when the flag is raised. Clones share the underlying flag, so
/// the caller keeps one handle and passes the other into the request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, unsignalled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Observed at the engine's next poll point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
