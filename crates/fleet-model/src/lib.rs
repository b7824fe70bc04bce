//! Domain types shared by the fleet execution layer.
//!
//! Nothing here performs I/O: the crate only describes clusters, their health,
//! batch tickets and the request/handle pair exchanged with the orchestrator.

mod domain;
pub use domain::*;
