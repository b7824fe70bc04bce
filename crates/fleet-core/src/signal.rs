//! Single-fire stop primitive.
//!
//! Every component with an explicit stop lifecycle wraps its termination
//! signal in a [`StopGuard`]: only the first [`StopGuard::fire`] returns `true`
//! and runs the stop sequence; later or concurrent callers can wait on
//! [`StopGuard::completed`] for that sequence to finish.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct StopGuard {
    fired: AtomicBool,
    signal: CancellationToken,
    done: CancellationToken,
}

impl StopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing signal token (e.g. the service-lifetime token).
    pub fn with_signal(signal: CancellationToken) -> Self {
        Self {
            fired: AtomicBool::new(false),
            signal,
            done: CancellationToken::new(),
        }
    }

    /// Cancels the signal. Returns `true` for exactly one caller.
    ///
    /// The signal is cancelled before returning on every call, so no caller
    /// ever observes `fire()` return while the signal is still live.
    pub fn fire(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        self.signal.cancel();
        first
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Token observing the signal.
    pub fn token(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// Marks the stop sequence as finished.
    pub fn complete(&self) {
        self.done.cancel();
    }

    /// Resolves once [`StopGuard::complete`] was called.
    pub async fn completed(&self) {
        self.done.cancelled().await
    }
}
