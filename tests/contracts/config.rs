//! Configuration files shape what a run emits.

use std::fs;

use strata::domain::entities::ArtifactBody;
use strata::{CompileConfig, CompilePipeline, Target};
use tempfile::TempDir;

use crate::common::*;

fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

/// CONTRACT: Naming, features and targets from the file reach the output
#[test]
fn contract_config_drives_pipeline() {
    let (_dir, path) = write_config(
        r#"
[naming]
table_prefix = "t_"

[features]
soft_delete = false

[targets]
enabled = ["postgres"]
"#,
    );
    let config = CompileConfig::load(&path).unwrap();
    let output = CompilePipeline::from_config(&config).run(&bundle("crm")).unwrap();

    let table = output.artifact("table:crm.t_company").expect("prefixed table");
    let ArtifactBody::Table(spec) = table.body() else {
        panic!("not a table");
    };
    assert!(spec.field("deleted_at").is_none());
    assert!(spec.field("updated_at").is_some());
    assert_eq!(output.rendered_for(Target::QueryMetadata).count(), 0);
    assert!(output.script(Target::Postgres).contains("CREATE TABLE crm.t_company ("));
}

/// CONTRACT: Unknown keys are warnings with a location and a suggestion
#[test]
fn contract_unknown_keys_warn() {
    let (_dir, path) = write_config("[naming]\nview_prefix = \"v_\"\ntabel_prefix = \"x_\"\n");

    let (config, warnings) = CompileConfig::load_with_warnings(&path).unwrap();

    assert_eq!(config.naming.view_prefix, "v_");
    assert_eq!(config.naming.table_prefix, CompileConfig::default().naming.table_prefix);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].key, "tabel_prefix");
    assert_eq!(warnings[0].line, Some(3));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("table_prefix"));
}

/// CONTRACT: Broken files fail with a stable code
#[test]
fn contract_config_errors_have_codes() {
    let (_dir, path) = write_config("[naming]\ntable_prefix = \"Bad-\"\n");
    assert_eq!(CompileConfig::load(&path).unwrap_err().code(), "config-value");

    let (_dir, path) = write_config("naming = 3\n");
    assert_eq!(CompileConfig::load(&path).unwrap_err().code(), "config-parse");

    let (_dir, path) = write_config("[patterns]\ntemplate_max_depth = 0\n");
    assert_eq!(CompileConfig::load(&path).unwrap_err().code(), "config-value");

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert_eq!(CompileConfig::load(&missing).unwrap_err().code(), "config-io");
}

/// CONTRACT: Pattern defaults from the file apply where instances are silent
#[test]
fn contract_pattern_depth_from_config() {
    let (_dir, path) = write_config("[patterns]\ntemplate_max_depth = 1\n");
    let config = CompileConfig::load(&path).unwrap();
    let output = CompilePipeline::from_config(&config).run(&bundle("catalog")).unwrap();
    let mut sb = strata::Sandbox::from_output(&output);

    let root = sb.insert("Page", serde_json::json!({})).unwrap();
    let child = sb
        .insert("Page", serde_json::json!({"fk_template": root["pk_page"]}))
        .unwrap();
    let err = sb
        .insert("Page", serde_json::json!({"fk_template": child["pk_page"]}))
        .unwrap_err();
    assert_eq!(
        err,
        strata::sandbox::SandboxError::Raised("template_depth_exceeded".to_string())
    );
}
