//! Domain Services
//!
//! Pure business logic services that operate on domain entities.
//! These services have no I/O dependencies and are easily testable.

mod artifacts;
mod graph;
mod model;
mod orderer;
mod stdlib;

pub use artifacts::{build_artifacts, identity_helpers, result_type_id};
pub use graph::{topological_order, CyclePolicy, DepthFirst, TraversalError};
pub use model::{EntityModel, ModelError};
pub use orderer::{order, OrderError};
pub use stdlib::{stdlib_entity, STDLIB_ENTITIES};
