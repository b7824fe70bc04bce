use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ClusterId;

/// Reachability of a remote cluster as last observed by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthStatus {
    /// Never checked.
    #[default]
    Unknown,
    /// Connected and the probe succeeded.
    Healthy,
    /// Connected but the probe failed.
    Unhealthy,
    /// Could not connect at all.
    Unreachable,
}

impl HealthStatus {
    /// Short symbolic name for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unreachable => "unreachable",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Snapshot of one cluster's health.
///
/// Records are replaced wholesale on every check; a field from an older check
/// never survives into a newer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub cluster: ClusterId,
    pub status: HealthStatus,
    /// Version string reported by the remote API, when the probe exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `None` only for synthesized `Unknown` records.
    #[serde(with = "crate::domain::timestamp::opt_secs")]
    pub checked_at: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthRecord {
    /// Record for a cluster that has never been checked.
    pub fn unknown(cluster: ClusterId) -> Self {
        Self {
            cluster,
            status: HealthStatus::Unknown,
            version: None,
            checked_at: None,
            error: None,
        }
    }

    pub fn healthy(cluster: ClusterId, version: Option<String>) -> Self {
        Self {
            cluster,
            status: HealthStatus::Healthy,
            version,
            checked_at: Some(SystemTime::now()),
            error: None,
        }
    }

    pub fn unhealthy(cluster: ClusterId, error: impl Into<String>) -> Self {
        Self {
            cluster,
            status: HealthStatus::Unhealthy,
            version: None,
            checked_at: Some(SystemTime::now()),
            error: Some(error.into()),
        }
    }

    pub fn unreachable(cluster: ClusterId, error: impl Into<String>) -> Self {
        Self {
            cluster,
            status: HealthStatus::Unreachable,
            version: None,
            checked_at: Some(SystemTime::now()),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_record_has_no_check_time() {
        let rec = HealthRecord::unknown(ClusterId::from("c1"));
        assert_eq!(rec.status, HealthStatus::Unknown);
        assert!(rec.checked_at.is_none());
        assert!(rec.error.is_none());
    }

    #[test]
    fn unreachable_record_keeps_error_text() {
        let rec = HealthRecord::unreachable(ClusterId::from("c1"), "connection refused");
        assert_eq!(rec.status, HealthStatus::Unreachable);
        assert_eq!(rec.error.as_deref(), Some("connection refused"));
        assert!(rec.checked_at.is_some());
        assert!(rec.version.is_none());
    }

    #[test]
    fn wire_shape_uses_camel_case() {
        let rec = HealthRecord::healthy(ClusterId::from("c1"), Some("8.0.1".into()));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["cluster"], "c1");
        assert_eq!(json["version"], "8.0.1");
        assert!(json["checkedAt"].is_u64());
        assert!(json.get("error").is_none());
    }
}
