//! Strata - business entity compiler
//!
//! Strata takes declarative specifications of business entities (fields,
//! relations, reusable patterns and multi-step actions) and compiles them
//! into a relational schema: tables, constraints, indexes, stored routines
//! and the annotations a query layer needs to expose them.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod sandbox;

// Re-exports for convenience
pub use application::{compile_batch, CompileFailure, CompileOutput, CompilePipeline};
pub use config::CompileConfig;
pub use domain::entities::{EntityDecl, SpecBundle};
pub use domain::ports::{CompileEvent, CompileEventSink, NoopEventSink, TargetEmitter};
pub use domain::value_objects::{Diagnostic, ModelSettings, Severity, Target};
pub use error::{ErrorClass, StrataError, StrataResult};
pub use infrastructure::{JsonEventSink, PostgresEmitter, QueryMetadataEmitter, TracingEventSink};
pub use sandbox::Sandbox;
