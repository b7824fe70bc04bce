use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{ActorId, BatchId, BatchType, ChildId, Operation, ResourceId};

/// Lifecycle of a parent batch ticket.
///
/// ```text
/// PendingApproval ──approve──► Processing ──► Completed | PartiallyFailed
///                                   ▲                         │
///                                   └────── requeue failed ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    PendingApproval,
    Processing,
    Completed,
    PartiallyFailed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::PendingApproval => "pending_approval",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::PartiallyFailed => "partially_failed",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::PartiallyFailed)
    }
}

/// Lifecycle of a single child ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ChildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildStatus::Pending => "pending",
            ChildStatus::Running => "running",
            ChildStatus::Succeeded => "succeeded",
            ChildStatus::Failed => "failed",
            ChildStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> to` is an allowed edge.
    ///
    /// `Failed -> Pending` is the requeue edge.
    pub fn can_transition(&self, to: ChildStatus) -> bool {
        use ChildStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Failed, Cancelled)
                | (Failed, Pending)
        )
    }
}

/// Aggregate child counters of a parent ticket.
///
/// Running children are counted as `pending`, so
/// `succeeded + failed + pending + cancelled == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounts {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub pending: u32,
    pub cancelled: u32,
}

impl BatchCounts {
    /// Counters for a freshly created parent with `total` pending children.
    pub fn new(total: u32) -> Self {
        Self {
            total,
            pending: total,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed + self.pending + self.cancelled == self.total
    }

    /// No child is waiting or running.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }

    /// Moves one child from the bucket of `from` into the bucket of `to`.
    pub fn record(&mut self, from: ChildStatus, to: ChildStatus) {
        let c = self.bucket(from);
        *c = c.saturating_sub(1);
        *self.bucket(to) += 1;
    }

    /// Moves `n` children from the bucket of `from` into the bucket of `to`.
    pub fn record_many(&mut self, from: ChildStatus, to: ChildStatus, n: u32) {
        for _ in 0..n {
            self.record(from, to);
        }
    }

    /// Parent status once every child has settled.
    pub fn settled_status(&self) -> BatchStatus {
        if self.failed > 0 {
            BatchStatus::PartiallyFailed
        } else {
            BatchStatus::Completed
        }
    }

    fn bucket(&mut self, status: ChildStatus) -> &mut u32 {
        match status {
            ChildStatus::Pending | ChildStatus::Running => &mut self.pending,
            ChildStatus::Succeeded => &mut self.succeeded,
            ChildStatus::Failed => &mut self.failed,
            ChildStatus::Cancelled => &mut self.cancelled,
        }
    }
}

/// Parent record of one batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTicket {
    pub id: BatchId,
    pub batch_type: BatchType,
    pub operation: Operation,
    pub status: BatchStatus,
    pub creator: ActorId,
    /// Caller-supplied idempotency key; unique per `(creator, batch_type)`.
    pub request_id: String,
    pub counts: BatchCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<ActorId>,
    #[serde(with = "crate::domain::timestamp::secs")]
    pub created_at: SystemTime,
    #[serde(with = "crate::domain::timestamp::secs")]
    pub updated_at: SystemTime,
}

/// One per-resource unit of work owned by a parent ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildTicket {
    pub id: ChildId,
    pub batch_id: BatchId,
    /// Position in the submitted item list, starting at 1.
    pub seq: u32,
    pub resource_type: String,
    pub resource_id: ResourceId,
    pub status: ChildStatus,
    /// Number of execution attempts so far.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "crate::domain::timestamp::secs")]
    pub updated_at: SystemTime,
}
