use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleet_agentd::{Agent, AgentConfig, BoxError, JobQueue};
use fleet_health::{ClusterClient, ClusterClientFactory, ClusterError, ProbeInfo, StaticInventory};
use fleet_model::ClusterId;
use fleet_observe::logger_init;
use fleet_prometheus::{Encoder, PrometheusMetrics, TextEncoder};

/// Watches clusters listed as `FLEET_CLUSTERS=eu-1=10.0.0.1:6443,us-2=10.1.0.1:6443`.
/// A cluster is reachable when its API address accepts a TCP connection.
struct TcpFactory {
    endpoints: HashMap<ClusterId, String>,
}

struct TcpClient {
    stream: TcpStream,
}

#[async_trait]
impl ClusterClient for TcpClient {
    async fn probe(&self) -> Result<ProbeInfo, ClusterError> {
        self.stream
            .peer_addr()
            .map_err(|e| ClusterError::Probe(e.to_string()))?;
        Ok(ProbeInfo::default())
    }
}

#[async_trait]
impl ClusterClientFactory for TcpFactory {
    async fn resolve(&self, cluster: &ClusterId) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let addr = self
            .endpoints
            .get(cluster)
            .ok_or_else(|| ClusterError::Connect(format!("no endpoint for {cluster}")))?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClusterError::Connect(format!("{addr}: {e}")))?;
        Ok(Arc::new(TcpClient { stream }))
    }
}

/// Stands in for the persistent job-queue consumer.
struct LoggingQueue;

#[async_trait]
impl JobQueue for LoggingQueue {
    async fn start(&self, _ctx: CancellationToken) -> Result<(), BoxError> {
        info!("job queue consumer attached");
        Ok(())
    }

    async fn stop(&self, _ctx: CancellationToken) -> Result<(), BoxError> {
        info!("job queue consumer detached");
        Ok(())
    }
}

fn endpoints(raw: &str) -> anyhow::Result<HashMap<ClusterId, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, addr) = entry
                .split_once('=')
                .with_context(|| format!("FLEET_CLUSTERS entry {entry:?} is not id=host:port"))?;
            Ok((ClusterId::from(id.trim()), addr.trim().to_string()))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Config + logger
    let cfg = AgentConfig::from_env()?;
    logger_init(&cfg.logger)?;
    info!(format = %cfg.logger.format, level = %cfg.logger.level, "logger initialized");

    // 2) Metrics
    let metrics = PrometheusMetrics::new()?;

    // 3) Clusters
    let endpoints = endpoints(&std::env::var("FLEET_CLUSTERS").unwrap_or_default())?;
    let inventory = StaticInventory::new(endpoints.keys().cloned());
    info!(clusters = endpoints.len(), "cluster inventory loaded");

    // 4) Agent
    let agent = Agent::from_config(
        &cfg,
        Arc::new(metrics.clone()),
        Arc::new(TcpFactory { endpoints }),
        Arc::new(inventory),
        Arc::new(LoggingQueue),
    );
    agent.run_until_signal().await?;

    // 5) Final metrics dump
    let mut buf = Vec::new();
    TextEncoder::new().encode(&metrics.gather(), &mut buf)?;
    info!(metrics = %String::from_utf8_lossy(&buf), "final metrics");
    Ok(())
}
