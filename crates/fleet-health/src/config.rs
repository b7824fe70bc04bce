use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between two full check passes.
    pub interval: Duration,
    /// Upper bound for resolving a client and, separately, for the probe.
    pub probe_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
        }
    }
}
