use fleet_core::{MetricsBackend, TaskOutcome};
use fleet_model::HealthStatus;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, core::Collector, proto::MetricFamily};

const HEALTH_STATUSES: [HealthStatus; 4] = [
    HealthStatus::Unknown,
    HealthStatus::Healthy,
    HealthStatus::Unhealthy,
    HealthStatus::Unreachable,
];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    tasks_started: IntCounterVec,
    tasks_finished: IntCounterVec,
    tasks_running: IntGaugeVec,
    cluster_health: IntGaugeVec,
    batches_accepted: IntCounterVec,
    batch_items: IntCounterVec,
    batches_rejected: IntCounterVec,
}

impl PrometheusMetrics {
    /// Creates the backend with its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Registers every metric in `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let tasks_started = counter(
            &registry,
            "fleet_tasks_started_total",
            "Tasks picked up by a pool worker",
            &["pool"],
        )?;
        let tasks_finished = counter(
            &registry,
            "fleet_tasks_finished_total",
            "Tasks that left a pool, by outcome",
            &["pool", "outcome"],
        )?;
        let tasks_running = gauge(
            &registry,
            "fleet_tasks_running",
            "Tasks currently executing",
            &["pool"],
        )?;
        let cluster_health = gauge(
            &registry,
            "fleet_cluster_health",
            "Last observed cluster health, 1 for the current status",
            &["cluster", "status"],
        )?;
        let batches_accepted = counter(
            &registry,
            "fleet_batches_accepted_total",
            "Batch requests accepted",
            &["batch_type"],
        )?;
        let batch_items = counter(
            &registry,
            "fleet_batch_items_total",
            "Items carried by accepted batch requests",
            &["batch_type"],
        )?;
        let batches_rejected = counter(
            &registry,
            "fleet_batches_rejected_total",
            "Batch requests refused, by reason",
            &["reason"],
        )?;

        Ok(Self {
            registry,
            tasks_started,
            tasks_finished,
            tasks_running,
            cluster_health,
            batches_accepted,
            batch_items,
            batches_rejected,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let c = IntCounterVec::new(Opts::new(name, help), labels)?;
    register(registry, c.clone())?;
    Ok(c)
}

fn gauge(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntGaugeVec, prometheus::Error> {
    let g = IntGaugeVec::new(Opts::new(name, help), labels)?;
    register(registry, g.clone())?;
    Ok(g)
}

fn register<C: Collector + 'static>(registry: &Registry, c: C) -> Result<(), prometheus::Error> {
    registry.register(Box::new(c))
}

impl MetricsBackend for PrometheusMetrics {
    fn task_started(&self, pool: &str) {
        self.tasks_started.with_label_values(&[pool]).inc();
        self.tasks_running.with_label_values(&[pool]).inc();
    }

    fn task_finished(&self, pool: &str, outcome: TaskOutcome) {
        self.tasks_finished
            .with_label_values(&[pool, outcome.as_str()])
            .inc();
        // skipped tasks never started
        if outcome != TaskOutcome::Skipped {
            self.tasks_running.with_label_values(&[pool]).dec();
        }
    }

    fn health_observed(&self, cluster: &str, status: HealthStatus) {
        for s in HEALTH_STATUSES {
            let v = i64::from(s == status);
            self.cluster_health
                .with_label_values(&[cluster, s.as_str()])
                .set(v);
        }
    }

    fn batch_accepted(&self, batch_type: &str, items: usize) {
        self.batches_accepted.with_label_values(&[batch_type]).inc();
        self.batch_items
            .with_label_values(&[batch_type])
            .inc_by(items as u64);
    }

    fn batch_rejected(&self, reason: &'static str) {
        self.batches_rejected.with_label_values(&[reason]).inc();
    }
}
