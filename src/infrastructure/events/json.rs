//! JSON Event Sink
//!
//! Outputs compile events as NDJSON for CI/automation consumption.

use crate::domain::ports::{CompileEvent, CompileEventSink};
use std::io::{self, Write};
use std::sync::Mutex;

/// Event sink that outputs NDJSON events to stdout
pub struct JsonEventSink {
    /// Mutex to ensure thread-safe writes
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonEventSink {
    /// Create a new JSON event sink writing to stdout
    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Create a JSON event sink writing to a custom writer
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn write_event(&self, event: serde_json::Value) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", event);
            let _ = writer.flush();
        }
    }
}

impl CompileEventSink for JsonEventSink {
    fn on_event(&self, event: CompileEvent) {
        let json = match event {
            CompileEvent::RunStarted { unit, entity_count } => {
                serde_json::json!({
                    "event": "start",
                    "command": "compile",
                    "unit": unit,
                    "entity_count": entity_count,
                })
            }

            CompileEvent::StageCompleted { stage, count } => {
                serde_json::json!({
                    "event": "stage",
                    "command": "compile",
                    "stage": stage.as_str(),
                    "count": count,
                })
            }

            CompileEvent::PatternApplied { entity, pattern } => {
                serde_json::json!({
                    "event": "pattern_applied",
                    "command": "compile",
                    "entity": entity,
                    "pattern": pattern,
                })
            }

            CompileEvent::ActionCompiled {
                entity,
                action,
                ops,
            } => {
                serde_json::json!({
                    "event": "action_compiled",
                    "command": "compile",
                    "entity": entity,
                    "action": action,
                    "ops": ops,
                })
            }

            CompileEvent::ArtifactEmitted { index, id, target } => {
                serde_json::json!({
                    "event": "item_emitted",
                    "command": "compile",
                    "index": index,
                    "id": id.as_str(),
                    "target": target.key(),
                })
            }

            CompileEvent::Diagnostic { diagnostic } => {
                serde_json::json!({
                    "event": "diagnostic",
                    "command": "compile",
                    "severity": diagnostic.severity,
                    "code": diagnostic.code,
                    "message": diagnostic.message,
                    "location": diagnostic.location.map(|l| l.to_string()),
                })
            }

            CompileEvent::RunFinished {
                unit,
                artifact_count,
                warning_count,
            } => {
                let status = if warning_count == 0 {
                    "success"
                } else {
                    "warnings"
                };
                serde_json::json!({
                    "event": "complete",
                    "command": "compile",
                    "status": status,
                    "unit": unit,
                    "artifacts": artifact_count,
                    "warnings": warning_count,
                })
            }

            CompileEvent::RunFailed {
                unit,
                code,
                message,
            } => {
                serde_json::json!({
                    "event": "error",
                    "command": "compile",
                    "unit": unit,
                    "code": code,
                    "message": message,
                })
            }
        };

        self.write_event(json);
    }

    fn wants_detailed_events(&self) -> bool {
        true // JSON mode wants all events
    }
}
