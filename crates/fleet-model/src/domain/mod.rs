mod ids;
pub use ids::{ActorId, BatchId, ChildId, ClusterId};

mod health;
pub use health::{HealthRecord, HealthStatus};

mod batch_kind;
pub use batch_kind::{BatchType, Operation};

mod ticket;
pub use ticket::{BatchCounts, BatchStatus, BatchTicket, ChildStatus, ChildTicket};

mod request;
pub use request::{BatchItem, BatchRequest, TrackingHandle};

mod error;
pub use error::ModelError;

mod timestamp;

/// Identifier of a resource inside a remote cluster (VM name, ticket id, ...).
pub type ResourceId = String;
