//! Application Layer
//!
//! Use cases that orchestrate a compile run.
//! This layer:
//! - Depends on Domain layer (entities, services, patterns, actions, ports)
//! - Does NOT contain business rules (those are in Domain)
//! - Picks the infrastructure emitters and event sinks a run uses
//!
//! ## Use Cases
//!
//! - `CompilePipeline` - types, model, patterns, actions, ordering, emission
//! - `compile_batch` - independent bundles compiled in parallel

mod batch;
pub mod compile;

pub use batch::compile_batch;
pub use compile::{CompileFailure, CompileOutput, CompilePipeline};
