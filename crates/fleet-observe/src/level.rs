use std::{fmt, str::FromStr};

use tracing_subscriber::EnvFilter;

use crate::error::LoggerError;

/// `EnvFilter` directives, e.g. `info` or `info,fleet_batch=debug`,
/// validated when constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(level: impl Into<String>) -> Result<Self, LoggerError> {
        let raw = level.into();
        let directives = raw.trim();
        if directives.is_empty() {
            return Err(LoggerError::InvalidLogLevel(raw));
        }
        EnvFilter::try_new(directives).map_err(|_| LoggerError::InvalidLogLevel(raw.clone()))?;
        Ok(Self(directives.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn filter(&self) -> EnvFilter {
        EnvFilter::new(&self.0)
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
