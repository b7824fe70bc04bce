//! # Health monitor
//!
//! ```text
//! start(pools) ──► submit_detached(General, "health-monitor")
//!                      │
//!                      ├─► check_all()            (immediate pass)
//!                      └─► loop every `interval`:
//!                            ├─ service token cancelled ─► exit
//!                            ├─ stop() fired            ─► exit
//!                            └─ tick                    ─► check_all()
//!
//! check_all():
//!   inventory.enabled_clusters()
//!   for each cluster (sequential, one failure never stops the pass):
//!       check_cluster() ─► cache.update(record)
//!   cache.retain_known(clusters)
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use fleet_core::{
    MetricsHandle, NoopMetrics, PoolError, PoolName, StopGuard, TaskError, TaskFn, TaskPools,
};
use fleet_model::{ClusterId, HealthRecord};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::HealthCache;
use crate::client::{ClusterClientFactory, ClusterInventory};
use crate::config::MonitorConfig;

const TASK_NAME: &str = "health-monitor";

pub struct HealthMonitor {
    cfg: MonitorConfig,
    factory: Arc<dyn ClusterClientFactory>,
    inventory: Arc<dyn ClusterInventory>,
    cache: HealthCache,
    metrics: MetricsHandle,
    started: AtomicBool,
    stop: StopGuard,
}

impl HealthMonitor {
    pub fn new(
        cfg: MonitorConfig,
        factory: Arc<dyn ClusterClientFactory>,
        inventory: Arc<dyn ClusterInventory>,
    ) -> Self {
        Self {
            cfg,
            factory,
            inventory,
            cache: HealthCache::new(),
            metrics: NoopMetrics::handle(),
            started: AtomicBool::new(false),
            stop: StopGuard::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cache(&self) -> &HealthCache {
        &self.cache
    }

    /// Latest record for `cluster`; `Unknown` when never checked.
    pub fn get_health(&self, cluster: &ClusterId) -> HealthRecord {
        self.cache.get(cluster)
    }

    pub fn update_health(&self, record: HealthRecord) {
        self.metrics
            .health_observed(record.cluster.as_str(), record.status);
        self.cache.update(record);
    }

    /// Every cached record, sorted by cluster id.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        self.cache.snapshot()
    }

    /// Checks one cluster. Never fails: every outcome is expressed as a record.
    ///
    /// - client resolution fails or times out ─► `Unreachable`
    /// - probe fails or times out              ─► `Unhealthy`
    /// - otherwise                             ─► `Healthy` with the probe's version
    #[instrument(level = "debug", skip_all, fields(cluster = %cluster))]
    pub async fn check_cluster(&self, ctx: &CancellationToken, cluster: &ClusterId) -> HealthRecord {
        let check = async {
            let limit = self.cfg.probe_timeout;
            let client = match timeout(limit, self.factory.resolve(cluster)).await {
                Ok(Ok(client)) => client,
                Ok(Err(e)) => return HealthRecord::unreachable(cluster.clone(), e.to_string()),
                Err(_) => {
                    return HealthRecord::unreachable(
                        cluster.clone(),
                        format!("connect timed out after {limit:?}"),
                    );
                }
            };
            match timeout(limit, client.probe()).await {
                Ok(Ok(info)) => HealthRecord::healthy(cluster.clone(), info.version),
                Ok(Err(e)) => HealthRecord::unhealthy(cluster.clone(), e.to_string()),
                Err(_) => HealthRecord::unhealthy(
                    cluster.clone(),
                    format!("probe timed out after {limit:?}"),
                ),
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                let mut rec = HealthRecord::unknown(cluster.clone());
                rec.error = Some("health check cancelled".to_string());
                rec
            }
            rec = check => rec,
        }
    }

    /// Runs one pass over every enabled cluster and returns how many records
    /// were written. Stops early, without writing, once `ctx` is cancelled or
    /// the monitor is stopped.
    pub async fn check_all(&self, ctx: &CancellationToken) -> usize {
        let clusters = match self.inventory.enabled_clusters().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "health pass skipped: cluster inventory unavailable");
                return 0;
            }
        };

        let mut written = 0;
        for cluster in &clusters {
            if ctx.is_cancelled() || self.stop.is_fired() {
                debug!(checked = written, "health pass interrupted");
                return written;
            }
            let rec = self.check_cluster(ctx, cluster).await;
            if ctx.is_cancelled() {
                return written;
            }
            if !rec.status.is_healthy() {
                warn!(
                    cluster = %cluster,
                    status = rec.status.as_str(),
                    error = rec.error.as_deref().unwrap_or(""),
                    "cluster not healthy"
                );
            }
            self.update_health(rec);
            written += 1;
        }

        let pruned = self.cache.retain_known(&clusters);
        debug!(checked = written, pruned, "health pass finished");
        written
    }

    /// Starts the periodic loop as a detached task on the general pool.
    ///
    /// A second call is a no-op.
    pub async fn start(self: &Arc<Self>, pools: &TaskPools) -> Result<(), PoolError> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("health monitor already started");
            return Ok(());
        }

        let me = Arc::clone(self);
        let task = TaskFn::arc(TASK_NAME, move |ctx: CancellationToken| {
            let me = Arc::clone(&me);
            async move { me.run_loop(ctx).await }
        });

        if let Err(e) = pools.submit_detached(PoolName::General, task).await {
            self.started.store(false, Ordering::Release);
            return Err(e);
        }
        info!(interval_ms = self.cfg.interval.as_millis() as u64, "health monitor started");
        Ok(())
    }

    /// Terminates the periodic loop. Idempotent and safe under concurrency.
    pub fn stop(&self) {
        if self.stop.fire() {
            info!("health monitor stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_fired()
    }

    async fn run_loop(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        let stop = self.stop.token();
        if stop.is_cancelled() {
            return Ok(());
        }

        self.check_all(&ctx).await;

        let mut ticker = interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the initial pass already ran
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_all(&ctx).await;
                }
            }
        }

        debug!("health monitor loop exited");
        Ok(())
    }
}
