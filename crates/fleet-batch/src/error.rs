use std::{fmt, time::Duration};

use thiserror::Error;

/// Which rate-limit layer refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    Global,
    Actor,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Global => "global",
            LimitScope::Actor => "actor",
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("{scope} rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        scope: LimitScope,
        retry_after: Duration,
    },
    #[error("rate limit backend failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row violated a storage constraint; the whole write was rolled back.
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Errors surfaced by the orchestrator to the request layer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Structural or semantic validation failure. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Item count above the limit of the `(batch type, operation)` pair.
    #[error("batch too large: {requested} items exceeds the limit of {limit}")]
    TooLarge { limit: usize, requested: usize },

    #[error("{scope} rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited {
        scope: LimitScope,
        retry_after: Duration,
    },

    #[error("batch not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Transient infrastructure failure. No partial state was left behind.
    #[error("storage failure: {0}")]
    Store(String),
}

impl BatchError {
    /// Short stable label (snake_case) for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BatchError::InvalidRequest(_) => "invalid_request",
            BatchError::TooLarge { .. } => "batch_too_large",
            BatchError::RateLimited { .. } => "rate_limited",
            BatchError::NotFound(_) => "not_found",
            BatchError::Forbidden(_) => "forbidden",
            BatchError::Store(_) => "store_failure",
        }
    }

    /// Retry hint for rate-limited requests.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BatchError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<StoreError> for BatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => BatchError::NotFound(what),
            other => BatchError::Store(other.to_string()),
        }
    }
}

impl From<RateLimitError> for BatchError {
    fn from(e: RateLimitError) -> Self {
        match e {
            RateLimitError::Exceeded { scope, retry_after } => {
                BatchError::RateLimited { scope, retry_after }
            }
            RateLimitError::Backend(msg) => BatchError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_with_hint() {
        let e: BatchError = RateLimitError::Exceeded {
            scope: LimitScope::Actor,
            retry_after: Duration::from_secs(12),
        }
        .into();
        assert_eq!(e.as_label(), "rate_limited");
        assert_eq!(e.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(e.to_string(), "actor rate limit exceeded, retry after 12s");
    }

    #[test]
    fn store_not_found_is_not_a_storage_failure() {
        let e: BatchError = StoreError::NotFound("b1".into()).into();
        assert!(matches!(e, BatchError::NotFound(_)));

        let e: BatchError = StoreError::Backend("conn reset".into()).into();
        assert_eq!(e.as_label(), "store_failure");
        assert_eq!(e.retry_after(), None);
    }

    #[test]
    fn too_large_reports_limit() {
        let e = BatchError::TooLarge {
            limit: 50,
            requested: 51,
        };
        assert_eq!(e.to_string(), "batch too large: 51 items exceeds the limit of 50");
    }
}
