//! Execution core of the fleet layer.
//!
//! Every unit of background work runs through a [`TaskPool`]; nothing in the
//! workspace spawns runtime tasks on its own. The [`TaskPools`] collection owns
//! the service-lifetime cancellation signal shared by detached work.
//!
//! ```text
//!  submit(ctx, task) ──► [ctx done? ──► Err(Cancelled)]
//!        │
//!        ▼ acquire slot (cancellable)
//!  queue ──► worker ──► [ctx done? ──► skip (debug)] ──► task.spawn(ctx)
//!                                                          │
//!                                     panic ──► PanicHandler, worker survives
//! ```

pub mod error;
pub use error::PoolError;
pub use taskvisor::{Task, TaskError, TaskFn, TaskRef};

mod signal;
pub use signal::StopGuard;

pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics, TaskOutcome};

mod pool;
pub use pool::{PanicHandler, PanicReport, PoolConfig, PoolStats, TaskPool, panic_message};

mod pools;
pub use pools::{PoolName, PoolsConfig, TaskPools};
