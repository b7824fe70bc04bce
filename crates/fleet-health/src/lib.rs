//! Periodic cluster-health monitoring.
//!
//! The [`HealthMonitor`] polls every enabled cluster through a
//! [`ClusterClientFactory`] and keeps the latest [`HealthRecord`] per cluster in
//! a [`HealthCache`]. Request paths only ever read the cache; no caller blocks
//! on a live remote call.
//!
//! [`HealthRecord`]: fleet_model::HealthRecord

mod cache;
pub use cache::HealthCache;

mod client;
pub use client::{ClusterClient, ClusterClientFactory, ClusterInventory, ProbeInfo, StaticInventory};

mod config;
pub use config::MonitorConfig;

mod error;
pub use error::ClusterError;

mod monitor;
pub use monitor::HealthMonitor;
