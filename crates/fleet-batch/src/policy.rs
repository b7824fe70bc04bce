use std::collections::HashMap;

use fleet_model::{BatchType, Operation};

/// Maximum item count per `(batch type, operation)` pair.
///
/// A single flat table: a pair that is not listed has no valid size and is
/// rejected before any size comparison.
#[derive(Debug, Clone)]
pub struct SizePolicy {
    limits: HashMap<(BatchType, Operation), usize>,
}

impl SizePolicy {
    /// Table with no entries.
    pub fn empty() -> Self {
        Self {
            limits: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, batch_type: BatchType, op: Operation, limit: usize) -> Self {
        self.limits.insert((batch_type, op), limit);
        self
    }

    pub fn limit(&self, batch_type: BatchType, op: Operation) -> Option<usize> {
        self.limits.get(&(batch_type, op)).copied()
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::empty()
            .with_limit(BatchType::Create, Operation::Create, 10)
            .with_limit(BatchType::Delete, Operation::Delete, 10)
            .with_limit(BatchType::Approval, Operation::Approve, 30)
            .with_limit(BatchType::Approval, Operation::Reject, 30)
            .with_limit(BatchType::Power, Operation::Start, 50)
            .with_limit(BatchType::Power, Operation::Stop, 50)
            .with_limit(BatchType::Power, Operation::Restart, 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_every_supported_pair() {
        let p = SizePolicy::default();
        for bt in BatchType::ALL {
            for op in bt.operations() {
                assert!(p.limit(bt, *op).is_some(), "{bt}/{op} has no limit");
            }
        }
        assert_eq!(p.limit(BatchType::Power, Operation::Restart), Some(50));
        assert_eq!(p.limit(BatchType::Delete, Operation::Delete), Some(10));
        assert_eq!(p.limit(BatchType::Power, Operation::Delete), None);
    }

    #[test]
    fn override_replaces_entry() {
        let p = SizePolicy::default().with_limit(BatchType::Create, Operation::Create, 3);
        assert_eq!(p.limit(BatchType::Create, Operation::Create), Some(3));
    }
}
