//! Errors of the execution core.
//!
//! [`PoolError`] is returned by submission: the pool refused the work.
//! Task bodies report [`taskvisor::TaskError`]; the pool only logs it.

use thiserror::Error;

/// Why a pool refused a submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The context bound to the submission was already cancelled,
    /// or got cancelled while waiting for a free slot.
    #[error("context cancelled")]
    Cancelled,
    /// The pool has been shut down and accepts no more work.
    #[error("pool {pool} is closed")]
    Closed { pool: &'static str },
}
