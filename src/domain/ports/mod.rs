//! Domain Ports (Interfaces)
//!
//! These traits define the boundaries of the domain layer.
//! Infrastructure layer provides concrete implementations.

pub mod compile_events;
pub mod emitter;

pub use compile_events::{CompileEvent, CompileEventSink, NoopEventSink, Stage};
pub use emitter::{EmitError, TargetEmitter};
