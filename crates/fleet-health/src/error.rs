use thiserror::Error;

/// Failures of the remote-cluster collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("failed to connect to cluster: {0}")]
    Connect(String),

    #[error("cluster probe failed: {0}")]
    Probe(String),

    #[error("cluster inventory unavailable: {0}")]
    Inventory(String),
}
