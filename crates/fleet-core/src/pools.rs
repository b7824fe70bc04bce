//! # Pool collection and detached work.
//!
//! [`TaskPools`] owns the two pools and the service-lifetime token.
//! Detached submissions are bound to that token instead of a caller context,
//! so they outlive the request that triggered them but still observe process
//! shutdown.
//!
//! ```text
//! shutdown():
//!   StopGuard::fire() ─► service token cancelled (detached work skips/stops)
//!        └─► general.shutdown()  (bounded drain)
//!        └─► cluster.shutdown()  (bounded drain)
//! ```

use std::{fmt, str::FromStr};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::PoolError;
use crate::metrics::{MetricsHandle, NoopMetrics};
use crate::pool::{PanicHandler, PoolConfig, TaskPool};
use crate::signal::StopGuard;
use taskvisor::TaskRef;

/// Which pool a submission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolName {
    /// Short general-purpose tasks (health polls, dispatch).
    General,
    /// Longer-lived remote-cluster operations (child ticket execution).
    Cluster,
}

impl PoolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolName::General => "general",
            PoolName::Cluster => "cluster",
        }
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(PoolName::General),
            "cluster" | "remote" => Ok(PoolName::Cluster),
            other => Err(format!("unknown pool: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolsConfig {
    pub general: PoolConfig,
    pub cluster: PoolConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            general: PoolConfig::general(),
            cluster: PoolConfig::cluster(),
        }
    }
}

pub struct TaskPools {
    general: TaskPool,
    cluster: TaskPool,
    service: StopGuard,
}

impl TaskPools {
    pub fn new(cfg: PoolsConfig) -> Self {
        Self::with_metrics(cfg, NoopMetrics::handle())
    }

    pub fn with_metrics(cfg: PoolsConfig, metrics: MetricsHandle) -> Self {
        let panic = crate::pool::log_panic_handler();
        Self::with_hooks(cfg, panic, metrics)
    }

    pub fn with_hooks(cfg: PoolsConfig, panic: PanicHandler, metrics: MetricsHandle) -> Self {
        let general = TaskPool::with_hooks(
            PoolName::General.as_str(),
            cfg.general,
            panic.clone(),
            metrics.clone(),
        );
        let cluster =
            TaskPool::with_hooks(PoolName::Cluster.as_str(), cfg.cluster, panic, metrics);
        info!(
            general = general.config().capacity,
            cluster = cluster.config().capacity,
            "task pools ready"
        );
        Self {
            general,
            cluster,
            service: StopGuard::new(),
        }
    }

    pub fn pool(&self, name: PoolName) -> &TaskPool {
        match name {
            PoolName::General => &self.general,
            PoolName::Cluster => &self.cluster,
        }
    }

    /// Submits `task` bound to the caller's context.
    pub async fn submit(
        &self,
        name: PoolName,
        ctx: &CancellationToken,
        task: TaskRef,
    ) -> Result<(), PoolError> {
        self.pool(name).submit(ctx, task).await
    }

    /// Submits `task` bound to the service-lifetime context.
    pub async fn submit_detached(&self, name: PoolName, task: TaskRef) -> Result<(), PoolError> {
        let ctx = self.service.token();
        self.pool(name).submit(&ctx, task).await
    }

    /// Token cancelled when the collection shuts down.
    pub fn service_token(&self) -> CancellationToken {
        self.service.token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.service.is_fired()
    }

    /// Cancels the service context, then drains each pool with its bounded timeout.
    ///
    /// Safe to call repeatedly and concurrently: later callers wait for the
    /// first caller's drain to finish.
    pub async fn shutdown(&self) {
        if !self.service.fire() {
            self.service.completed().await;
            return;
        }
        info!("task pools shutting down");

        let general = self.general.shutdown().await;
        let cluster = self.cluster.shutdown().await;

        info!(general_drained = general, cluster_drained = cluster, "task pools stopped");
        self.service.complete();
    }
}
