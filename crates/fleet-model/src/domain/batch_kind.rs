use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Family of a batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchType {
    /// Start/stop/restart virtual machines.
    #[serde(rename = "BATCH_POWER")]
    Power,
    /// Provision new virtual machines.
    #[serde(rename = "BATCH_CREATE")]
    Create,
    /// Destroy virtual machines.
    #[serde(rename = "BATCH_DELETE")]
    Delete,
    /// Approve or reject pending lifecycle tickets.
    #[serde(rename = "BATCH_APPROVAL")]
    Approval,
}

impl BatchType {
    pub const ALL: [BatchType; 4] = [
        BatchType::Power,
        BatchType::Create,
        BatchType::Delete,
        BatchType::Approval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::Power => "BATCH_POWER",
            BatchType::Create => "BATCH_CREATE",
            BatchType::Delete => "BATCH_DELETE",
            BatchType::Approval => "BATCH_APPROVAL",
        }
    }

    /// Operations accepted by this batch type.
    pub fn operations(&self) -> &'static [Operation] {
        match self {
            BatchType::Power => &[Operation::Start, Operation::Stop, Operation::Restart],
            BatchType::Create => &[Operation::Create],
            BatchType::Delete => &[Operation::Delete],
            BatchType::Approval => &[Operation::Approve, Operation::Reject],
        }
    }

    pub fn supports(&self, op: Operation) -> bool {
        self.operations().contains(&op)
    }

    /// Parses a `(batch type, operation)` pair and checks that they belong together.
    pub fn parse_pair(batch_type: &str, operation: &str) -> Result<(Self, Operation), ModelError> {
        let bt: BatchType = batch_type.parse()?;
        let op: Operation = operation.parse()?;
        if !bt.supports(op) {
            return Err(ModelError::UnsupportedOperation {
                batch_type: bt.as_str(),
                operation: op.as_str(),
            });
        }
        Ok((bt, op))
    }
}

impl fmt::Display for BatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        let norm = norm.strip_prefix("batch_").unwrap_or(&norm);
        match norm {
            "power" => Ok(BatchType::Power),
            "create" => Ok(BatchType::Create),
            "delete" => Ok(BatchType::Delete),
            "approval" => Ok(BatchType::Approval),
            _ => Err(ModelError::UnknownBatchType(s.to_string())),
        }
    }
}

/// Concrete action applied to every item of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Start,
    Stop,
    Restart,
    Create,
    Delete,
    Approve,
    Reject,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Restart => "restart",
            Operation::Create => "create",
            Operation::Delete => "delete",
            Operation::Approve => "approve",
            Operation::Reject => "reject",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Operation::Start),
            "stop" => Ok(Operation::Stop),
            "restart" | "reboot" => Ok(Operation::Restart),
            "create" => Ok(Operation::Create),
            "delete" => Ok(Operation::Delete),
            "approve" => Ok(Operation::Approve),
            "reject" => Ok(Operation::Reject),
            _ => Err(ModelError::UnknownOperation(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_type_accepts_prefixed_and_bare_names() {
        assert_eq!("BATCH_POWER".parse::<BatchType>().unwrap(), BatchType::Power);
        assert_eq!("batch_delete".parse::<BatchType>().unwrap(), BatchType::Delete);
        assert_eq!(" approval ".parse::<BatchType>().unwrap(), BatchType::Approval);
        assert!("BATCH_MIGRATE".parse::<BatchType>().is_err());
    }

    #[test]
    fn parse_pair_rejects_foreign_operation() {
        assert_eq!(
            BatchType::parse_pair("BATCH_POWER", "restart").unwrap(),
            (BatchType::Power, Operation::Restart)
        );
        let err = BatchType::parse_pair("BATCH_POWER", "delete").unwrap_err();
        assert_eq!(
            err,
            ModelError::UnsupportedOperation {
                batch_type: "BATCH_POWER",
                operation: "delete",
            }
        );
        assert!(matches!(
            BatchType::parse_pair("BATCH_POWER", "hibernate"),
            Err(ModelError::UnknownOperation(_))
        ));
    }

    #[test]
    fn batch_type_serializes_with_prefix() {
        let json = serde_json::to_string(&BatchType::Power).unwrap();
        assert_eq!(json, r#""BATCH_POWER""#);
    }
}
