use serde::{Deserialize, Serialize};

use crate::{BatchId, BatchStatus, ResourceId};

/// One target of a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub resource_type: String,
    pub resource_id: ResourceId,
}

impl BatchItem {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// Multi-target operator request as received from the request layer.
///
/// `batch_type` and `operation` are kept as raw strings; the orchestrator
/// parses and validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Idempotency key supplied by the caller.
    pub request_id: String,
    pub batch_type: String,
    pub operation: String,
    #[serde(default)]
    pub items: Vec<BatchItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BatchRequest {
    pub fn new(
        request_id: impl Into<String>,
        batch_type: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            batch_type: batch_type.into(),
            operation: operation.into(),
            items: Vec::new(),
            reason: None,
        }
    }

    pub fn with_item(mut self, item: BatchItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = BatchItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Stable handle returned for an accepted (or deduplicated) batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingHandle {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    /// Location pollers query for progress.
    pub poll_url: String,
    /// Suggested delay before the next poll.
    pub retry_after_secs: u64,
}
