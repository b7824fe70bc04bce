use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use fleet_core::{MetricsHandle, PoolError, StopGuard, TaskPools};
use fleet_health::{ClusterClientFactory, ClusterInventory, HealthMonitor};
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::signal::wait_for_shutdown_signal;

/// Error type of external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Persistent job-queue consumer draining enqueued child-ticket work.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    async fn start(&self, ctx: CancellationToken) -> Result<(), BoxError>;

    /// Stops consuming. `ctx` is cancelled once the stop deadline passes.
    async fn stop(&self, ctx: CancellationToken) -> Result<(), BoxError>;
}

/// Optional module with its own shutdown hook.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn shutdown(&self) -> Result<(), BoxError>;
}

/// Underlying storage/connection resources, closed last.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn close(&self) -> Result<(), BoxError>;
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("job queue failed to start: {0}")]
    QueueStart(#[source] BoxError),
    #[error("health monitor failed to start: {0}")]
    Monitor(#[from] PoolError),
    #[error("agent already started")]
    AlreadyStarted,
    #[error("agent is shutting down")]
    ShuttingDown,
}

pub struct Agent {
    pools: Arc<TaskPools>,
    monitor: Arc<HealthMonitor>,
    queue: Arc<dyn JobQueue>,
    extensions: Vec<Arc<dyn Extension>>,
    storage: Option<Arc<dyn Storage>>,
    queue_stop_timeout: Duration,
    started: AtomicBool,
    stop: StopGuard,
}

impl Agent {
    pub fn new(pools: Arc<TaskPools>, monitor: Arc<HealthMonitor>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            pools,
            monitor,
            queue,
            extensions: Vec::new(),
            storage: None,
            queue_stop_timeout: Duration::from_secs(10),
            started: AtomicBool::new(false),
            stop: StopGuard::new(),
        }
    }

    /// Builds the pools and the health monitor described by `cfg`, both
    /// reporting to `metrics`.
    pub fn from_config(
        cfg: &AgentConfig,
        metrics: MetricsHandle,
        factory: Arc<dyn ClusterClientFactory>,
        inventory: Arc<dyn ClusterInventory>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let pools = Arc::new(TaskPools::with_metrics(
            cfg.pools.clone(),
            Arc::clone(&metrics),
        ));
        let monitor = Arc::new(
            HealthMonitor::new(cfg.monitor.clone(), factory, inventory).with_metrics(metrics),
        );
        Self::new(pools, monitor, queue).with_queue_stop_timeout(cfg.queue_stop_timeout)
    }

    /// Registers an extension; extensions shut down in registration order.
    pub fn with_extension(mut self, ext: Arc<dyn Extension>) -> Self {
        self.extensions.push(ext);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_queue_stop_timeout(mut self, t: Duration) -> Self {
        self.queue_stop_timeout = t;
        self
    }

    pub fn pools(&self) -> &Arc<TaskPools> {
        &self.pools
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn queue_stop_timeout(&self) -> Duration {
        self.queue_stop_timeout
    }

    /// Starts the queue consumer, runs one health pass, then starts the
    /// periodic health loop.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        if self.stop.is_fired() {
            return Err(LifecycleError::ShuttingDown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyStarted);
        }

        let ctx = self.pools.service_token();
        self.queue
            .start(ctx.clone())
            .await
            .map_err(LifecycleError::QueueStart)?;
        info!("job queue consumer started");

        let checked = self.monitor.check_all(&ctx).await;
        info!(clusters = checked, "initial health pass complete");

        self.monitor.start(&self.pools).await?;
        info!("agent ready");
        Ok(())
    }

    /// Stops everything in reverse order. Every step runs even when an
    /// earlier one failed; failures are logged.
    ///
    /// Repeated and concurrent calls wait for the first one to finish.
    pub async fn shutdown(&self) {
        if !self.stop.fire() {
            self.stop.completed().await;
            return;
        }
        info!("agent shutting down");

        self.monitor.stop();

        let ctx = CancellationToken::new();
        match timeout(self.queue_stop_timeout, self.queue.stop(ctx.clone())).await {
            Ok(Ok(())) => info!("job queue consumer stopped"),
            Ok(Err(e)) => warn!(error = %e, "job queue consumer failed to stop"),
            Err(_) => {
                ctx.cancel();
                warn!(
                    timeout_ms = self.queue_stop_timeout.as_millis() as u64,
                    "job queue consumer did not stop in time"
                );
            }
        }

        for ext in &self.extensions {
            if let Err(e) = ext.shutdown().await {
                warn!(extension = ext.name(), error = %e, "extension shutdown failed");
            }
        }

        self.pools.shutdown().await;

        if let Some(storage) = &self.storage
            && let Err(e) = storage.close().await
        {
            warn!(error = %e, "storage close failed");
        }

        self.stop.complete();
        info!("shutdown complete");
    }

    /// Starts, waits for a termination signal, then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), LifecycleError> {
        if let Err(e) = self.start().await {
            error!(error = %e, "agent failed to start");
            self.shutdown().await;
            return Err(e);
        }
        match wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "termination signal received"),
            Err(e) => warn!(error = %e, "signal handling unavailable; shutting down"),
        }
        self.shutdown().await;
        Ok(())
    }
}
