use std::{str::FromStr, time::Duration};

use fleet_core::PoolsConfig;
use fleet_health::MonitorConfig;
use fleet_observe::{LoggerConfig, LoggerFormat, LoggerLevel};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, assembled from `FLEET_*` environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub logger: LoggerConfig,
    pub monitor: MonitorConfig,
    pub pools: PoolsConfig,
    /// Upper bound for the job-queue consumer to stop.
    pub queue_stop_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            monitor: MonitorConfig::default(),
            pools: PoolsConfig::default(),
            queue_stop_timeout: Duration::from_secs(10),
        }
    }
}

impl AgentConfig {
    /// Reads the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AgentConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup("FLEET_LOG_LEVEL") {
            cfg.logger.level = LoggerLevel::new(raw.as_str()).map_err(|e| ConfigError::Invalid {
                key: "FLEET_LOG_LEVEL",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(raw) = lookup("FLEET_LOG_FORMAT") {
            cfg.logger.format = LoggerFormat::from_str(&raw).map_err(|e| ConfigError::Invalid {
                key: "FLEET_LOG_FORMAT",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(d) = secs(&lookup, "FLEET_HEALTH_INTERVAL_SECS")? {
            cfg.monitor.interval = d;
        }
        if let Some(d) = secs(&lookup, "FLEET_PROBE_TIMEOUT_SECS")? {
            cfg.monitor.probe_timeout = d;
        }
        if let Some(n) = positive(&lookup, "FLEET_POOL_GENERAL_SIZE")? {
            cfg.pools.general = cfg.pools.general.with_capacity(n as usize);
        }
        if let Some(n) = positive(&lookup, "FLEET_POOL_CLUSTER_SIZE")? {
            cfg.pools.cluster = cfg.pools.cluster.with_capacity(n as usize);
        }
        if let Some(d) = secs(&lookup, "FLEET_DRAIN_TIMEOUT_SECS")? {
            cfg.pools.general = cfg.pools.general.with_drain_timeout(d);
            cfg.pools.cluster = cfg.pools.cluster.with_drain_timeout(d);
        }
        if let Some(d) = secs(&lookup, "FLEET_QUEUE_STOP_TIMEOUT_SECS")? {
            cfg.queue_stop_timeout = d;
        }
        Ok(cfg)
    }
}

/// Parses a strictly positive integer.
fn positive<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason,
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid("must be greater than zero".into())),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(invalid(e.to_string())),
    }
}

fn secs<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(positive(lookup, key)?.map(Duration::from_secs))
}
