//! Compile Event Port
//!
//! Provides an observable interface for compile runs.
//! Enables progress reporting, JSON event streams, and debugging.

use crate::domain::value_objects::{ArtifactId, Diagnostic, Target};

/// Pipeline stage reported by [`CompileEvent::StageCompleted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Types,
    Model,
    Patterns,
    Actions,
    Order,
    Emit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Types => "types",
            Stage::Model => "model",
            Stage::Patterns => "patterns",
            Stage::Actions => "actions",
            Stage::Order => "order",
            Stage::Emit => "emit",
        }
    }
}

/// Event emitted during a compile run
#[derive(Debug, Clone)]
pub enum CompileEvent {
    /// Run started
    RunStarted { unit: String, entity_count: usize },

    /// A pipeline stage finished
    StageCompleted { stage: Stage, count: usize },

    /// Pattern expanded on one entity
    PatternApplied { entity: String, pattern: String },

    /// Action lowered into a routine
    ActionCompiled {
        entity: String,
        action: String,
        ops: usize,
    },

    /// Artifact rendered for one target
    ArtifactEmitted {
        index: usize,
        id: ArtifactId,
        target: Target,
    },

    /// Non-fatal diagnostic recorded
    Diagnostic { diagnostic: Diagnostic },

    /// Run completed
    RunFinished {
        unit: String,
        artifact_count: usize,
        warning_count: usize,
    },

    /// Run failed; nothing was emitted
    RunFailed {
        unit: String,
        code: String,
        message: String,
    },
}

/// Trait for receiving compile events
///
/// Implementations can be:
/// - TracingEventSink: forwards to `tracing`
/// - JsonEventSink: NDJSON event stream for CI
/// - NoopEventSink: Silent operation
pub trait CompileEventSink: Send + Sync {
    /// Handle a compile event
    fn on_event(&self, event: CompileEvent);

    /// Check if this sink wants detailed events (per pattern, action, artifact)
    ///
    /// Some sinks (like CI) may only want summary events.
    fn wants_detailed_events(&self) -> bool {
        true
    }
}

/// No-op event sink for silent operation
pub struct NoopEventSink;

impl CompileEventSink for NoopEventSink {
    fn on_event(&self, _event: CompileEvent) {}

    fn wants_detailed_events(&self) -> bool {
        false
    }
}
