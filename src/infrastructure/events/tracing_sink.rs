//! Tracing Event Sink
//!
//! Forwards compile events to `tracing`. Installing a subscriber is left
//! to the caller.

use tracing::{debug, info, warn};

use crate::domain::ports::{CompileEvent, CompileEventSink};
use crate::domain::value_objects::Severity;

/// Event sink that logs through `tracing`
pub struct TracingEventSink {
    detailed: bool,
}

impl TracingEventSink {
    pub fn new() -> Self {
        Self { detailed: false }
    }

    /// Also log per-pattern, per-action and per-artifact events.
    pub fn detailed(mut self) -> Self {
        self.detailed = true;
        self
    }
}

impl Default for TracingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileEventSink for TracingEventSink {
    fn on_event(&self, event: CompileEvent) {
        match event {
            CompileEvent::RunStarted { unit, entity_count } => {
                info!(unit = %unit, entities = entity_count, "compile started");
            }
            CompileEvent::StageCompleted { stage, count } => {
                debug!(stage = stage.as_str(), count, "stage completed");
            }
            CompileEvent::PatternApplied { entity, pattern } => {
                debug!(entity = %entity, pattern = %pattern, "pattern applied");
            }
            CompileEvent::ActionCompiled {
                entity,
                action,
                ops,
            } => {
                debug!(entity = %entity, action = %action, ops, "action compiled");
            }
            CompileEvent::ArtifactEmitted { index, id, target } => {
                debug!(index, id = %id, target = target.key(), "artifact emitted");
            }
            CompileEvent::Diagnostic { diagnostic } => match diagnostic.severity {
                Severity::Info => info!(code = %diagnostic.code, "{}", diagnostic.message),
                Severity::Warning | Severity::Error => {
                    warn!(code = %diagnostic.code, "{}", diagnostic.message)
                }
            },
            CompileEvent::RunFinished {
                unit,
                artifact_count,
                warning_count,
            } => {
                info!(
                    unit = %unit,
                    artifacts = artifact_count,
                    warnings = warning_count,
                    "compile finished"
                );
            }
            CompileEvent::RunFailed {
                unit,
                code,
                message,
            } => {
                warn!(unit = %unit, code = %code, "compile failed: {}", message);
            }
        }
    }

    fn wants_detailed_events(&self) -> bool {
        self.detailed
    }
}
