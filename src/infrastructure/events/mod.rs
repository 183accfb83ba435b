//! Event Sink Implementations
//!
//! Provides concrete implementations of CompileEventSink:
//! - JsonEventSink: NDJSON output for CI/automation
//! - TracingEventSink: forwards to `tracing`

mod json;
mod tracing_sink;

pub use json::JsonEventSink;
pub use tracing_sink::TracingEventSink;
