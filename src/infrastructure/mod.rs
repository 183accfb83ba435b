//! Infrastructure Layer
//!
//! Concrete implementations of domain ports.
//!
//! ## Structure
//!
//! - `emitters/` - Target emitters (PostgreSQL, query metadata)
//! - `events/` - Compile event sinks (NDJSON, tracing)

pub mod emitters;
pub mod events;

// Re-export for convenience
pub use emitters::{all_emitters, get_emitter, PostgresEmitter, QueryMetadataEmitter};
pub use events::{JsonEventSink, TracingEventSink};
