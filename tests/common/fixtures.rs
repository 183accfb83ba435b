//! Test fixtures.

use std::path::PathBuf;

use serde_json::Value;
use strata::sandbox::Row;
use strata::{CompileOutput, CompilePipeline, Sandbox, SpecBundle};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{}.yaml", name))
}

/// Parse a fixture bundle.
pub fn bundle(name: &str) -> SpecBundle {
    let path = fixture_path(name);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
    serde_yaml_ng::from_str(&text).unwrap_or_else(|e| panic!("invalid fixture {}: {}", name, e))
}

/// Compile a fixture with default settings.
pub fn compile(name: &str) -> CompileOutput {
    CompilePipeline::default()
        .run(&bundle(name))
        .unwrap_or_else(|e| panic!("{} failed to compile: {}", name, e))
}

pub fn sandbox(name: &str) -> Sandbox {
    Sandbox::from_output(&compile(name))
}

/// External id of a row.
pub fn id_of(row: &Row) -> String {
    row.get("id")
        .and_then(Value::as_str)
        .expect("row has an external id")
        .to_string()
}
