//! Metrics hooks.
//!
//! Components report through a [`MetricsBackend`]; the default [`NoopMetrics`]
//! discards everything. A Prometheus implementation lives in `fleet-prometheus`.

use std::sync::Arc;

use fleet_model::HealthStatus;

/// How a pooled task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Panicked,
    /// Never started: its context was cancelled while queued.
    Skipped,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded => "succeeded",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Panicked => "panicked",
            TaskOutcome::Skipped => "skipped",
        }
    }
}

pub trait MetricsBackend: Send + Sync + 'static {
    fn task_started(&self, _pool: &str) {}
    fn task_finished(&self, _pool: &str, _outcome: TaskOutcome) {}
    fn health_observed(&self, _cluster: &str, _status: HealthStatus) {}
    fn batch_accepted(&self, _batch_type: &str, _items: usize) {}
    fn batch_rejected(&self, _reason: &'static str) {}
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {}

impl NoopMetrics {
    pub fn handle() -> MetricsHandle {
        Arc::new(NoopMetrics)
    }
}
