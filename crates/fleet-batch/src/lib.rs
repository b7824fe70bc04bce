//! # fleet-batch
//!
//! Batch ticket orchestration: a parent request fans out into per-resource
//! child tickets, atomically and idempotently, behind two-layer rate limiting.
//!
//! ```text
//! BatchRequest ─► Orchestrator::execute
//!                   ├─ validate (type, operation, items)
//!                   ├─ TicketStore::find_by_idempotency_key ─► existing handle
//!                   ├─ SizePolicy::limit
//!                   ├─ in-flight slot for the key, store re-checked
//!                   ├─ RateLimiter::check_global
//!                   ├─ RateLimiter::check_per_actor(items)
//!                   └─ TicketStore::create_parent_and_children ─► TrackingHandle
//!
//! approve / requeue_failed ─► BatchRunner::dispatch
//!                               └─ one detached task per pending child
//!                                  on the cluster pool ─► ChildExecutor
//! ```

mod error;
pub use error::{BatchError, LimitScope, RateLimitError, StoreError};

mod policy;
pub use policy::SizePolicy;

mod inflight;

mod limiter;
pub use limiter::{RateLimiter, WindowLimiter, WindowLimiterConfig};

mod store;
pub use store::{CreateOutcome, InMemoryTicketStore, NewBatch, TicketStore};

mod runner;
pub use runner::{BatchRunner, ChildExecutor};

mod orchestrator;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
