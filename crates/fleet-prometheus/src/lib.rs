//! Prometheus metrics backend for the fleet execution layer.
//!
//! [`PrometheusMetrics`] implements [`fleet_core::MetricsBackend`]; hand it to
//! the pools, the health monitor and the orchestrator as a `MetricsHandle`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fleet_core::{PoolsConfig, TaskPools};
//! use fleet_prometheus::{Encoder, PrometheusMetrics};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let pools = TaskPools::with_metrics(PoolsConfig::default(), Arc::new(metrics.clone()));
//!
//! let families = metrics.gather();
//! let mut buf = Vec::new();
//! fleet_prometheus::TextEncoder::new().encode(&families, &mut buf)?;
//! # drop(pools);
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `fleet_tasks_started_total{pool}` - Counter
//! - `fleet_tasks_finished_total{pool, outcome}` - Counter
//! - `fleet_tasks_running{pool}` - Gauge
//! - `fleet_cluster_health{cluster, status}` - Gauge, 1 for the current status
//! - `fleet_batches_accepted_total{batch_type}` - Counter
//! - `fleet_batch_items_total{batch_type}` - Counter
//! - `fleet_batches_rejected_total{reason}` - Counter
//!
//! Serving `/metrics` is left to the embedding application.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
