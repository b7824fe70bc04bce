//! # fleet-agentd
//!
//! Application lifecycle: composes the task pools, the health monitor, the
//! job-queue consumer and registered extensions, and starts/stops them in a
//! fixed order.
//!
//! ```text
//! start:    queue.start ─► health check_all (sync) ─► monitor.start (detached)
//! shutdown: monitor.stop ─► queue.stop (bounded) ─► extensions ─► pools ─► storage
//! ```

mod config;
pub use config::{AgentConfig, ConfigError};

mod lifecycle;
pub use lifecycle::{Agent, BoxError, Extension, JobQueue, LifecycleError, Storage};

mod signal;
pub use signal::wait_for_shutdown_signal;
