use std::sync::Arc;

use async_trait::async_trait;
use fleet_model::ClusterId;

use crate::error::ClusterError;

/// Metadata returned by a successful probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub version: Option<String>,
}

/// Connected client of one remote cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lightweight "list a known resource" call used as the health probe.
    async fn probe(&self) -> Result<ProbeInfo, ClusterError>;
}

/// Resolves connected clients by cluster id.
#[async_trait]
pub trait ClusterClientFactory: Send + Sync + 'static {
    async fn resolve(&self, cluster: &ClusterId) -> Result<Arc<dyn ClusterClient>, ClusterError>;
}

/// Source of the clusters the monitor should watch.
#[async_trait]
pub trait ClusterInventory: Send + Sync + 'static {
    async fn enabled_clusters(&self) -> Result<Vec<ClusterId>, ClusterError>;
}

/// Fixed cluster list.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    clusters: Vec<ClusterId>,
}

impl StaticInventory {
    pub fn new(clusters: impl IntoIterator<Item = ClusterId>) -> Self {
        Self {
            clusters: clusters.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ClusterInventory for StaticInventory {
    async fn enabled_clusters(&self) -> Result<Vec<ClusterId>, ClusterError> {
        Ok(self.clusters.clone())
    }
}
