//! Compiling is a pure function of its input.

use std::sync::{Arc, Mutex};

use serde_json::json;
use strata::domain::entities::{EntityDecl, FieldDecl};
use strata::{
    compile_batch, CompileEvent, CompileEventSink, CompilePipeline, SpecBundle, Target,
};

use crate::common::*;

#[derive(Default)]
struct Recorder(Mutex<Vec<CompileEvent>>);

impl CompileEventSink for Recorder {
    fn on_event(&self, event: CompileEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// CONTRACT: Two compiles of the same input are byte-identical
#[test]
fn contract_compile_is_idempotent() {
    for name in ["sales", "bookings", "catalog", "customers"] {
        let first = compile(name);
        let second = compile(name);
        assert_eq!(first.fingerprint, second.fingerprint, "{}", name);
        for target in Target::ALL {
            assert_eq!(first.script(target), second.script(target), "{}", name);
        }
        let ids = |o: &strata::CompileOutput| -> Vec<String> {
            o.artifacts.iter().map(|a| a.id().to_string()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}

/// CONTRACT: Batch runs agree with single runs
#[test]
fn contract_batch_matches_single_runs() {
    let names = ["sales", "purchasing", "crm"];
    let bundles: Vec<SpecBundle> = names.iter().map(|n| bundle(n)).collect();
    let results = compile_batch(&CompilePipeline::default(), &bundles);

    for (name, result) in names.iter().zip(results) {
        assert_eq!(result.unwrap().fingerprint, compile(name).fingerprint);
    }
}

/// CONTRACT: A bad pattern config stops the run before anything is emitted
#[test]
fn contract_invalid_pattern_emits_nothing() {
    let entity = EntityDecl::new("Ticket", "support")
        .field(FieldDecl::enumeration("status", &["draft", "open"]))
        .pattern("state_machine", json!({"from_states": ["draft"]}));
    let bundle = SpecBundle::new("support").with_entity(entity);

    let recorder = Arc::new(Recorder::default());
    let pipeline = CompilePipeline::default().with_event_sink(recorder.clone());
    let failure = pipeline.run(&bundle).unwrap_err();

    assert_eq!(failure.code(), "invalid-config");
    let events = recorder.0.lock().unwrap();
    assert!(!events
        .iter()
        .any(|e| matches!(e, CompileEvent::ArtifactEmitted { .. } | CompileEvent::PatternApplied { .. })));
    assert!(matches!(events.last(), Some(CompileEvent::RunFailed { code, .. }) if code == "invalid-config"));
}
