//! Scenario: Pages inheriting layout from templates
//!
//! Journey: A landing page uses a section page as template, which in turn
//! uses the site's base page.
//!
//! Success Criteria:
//! - Resolution uses the root as base and lets each nearer link override it
//! - A link closing a cycle is rejected
//! - Chains deeper than the configured maximum are rejected

use serde_json::{json, Value};
use strata::sandbox::{Row, SandboxError};
use strata::Sandbox;

use crate::common::*;

fn page(sb: &mut Sandbox, values: Value, template: Option<&Row>) -> Row {
    let mut values = values;
    if let Some(template) = template {
        values["fk_template"] = template["pk_page"].clone();
    }
    sb.insert("Page", values).unwrap()
}

/// SCENARIO: A→B→C merges C, then B, then A
#[test]
fn scenario_template_chain_merges_nearest_last() {
    let mut sb = sandbox("catalog");
    let c = page(&mut sb, json!({"layout": "grid", "theme": "light", "title": "Base"}), None);
    let b = page(&mut sb, json!({"theme": "dark"}), Some(&c));
    let a = page(&mut sb, json!({"title": "Landing"}), Some(&b));

    let resolved = sb.resolve_template("Page", &id_of(&a)).unwrap();
    assert_eq!(
        Value::Object(resolved),
        json!({"layout": "grid", "theme": "dark", "title": "Landing"})
    );

    let base = sb.resolve_template("Page", &id_of(&c)).unwrap();
    assert_eq!(base["title"], json!("Base"));
}

/// SCENARIO: Pointing the root back at a descendant is cyclic
#[test]
fn scenario_template_cycle_rejected() {
    let mut sb = sandbox("catalog");
    let c = page(&mut sb, json!({"layout": "grid"}), None);
    let b = page(&mut sb, json!({}), Some(&c));
    let a = page(&mut sb, json!({}), Some(&b));

    let err = sb
        .update("Page", &id_of(&c), json!({"fk_template": a["pk_page"]}))
        .unwrap_err();
    assert_eq!(err, SandboxError::Raised("cyclic_template".to_string()));
    assert!(sb.row("Page", &id_of(&c)).unwrap()["fk_template"].is_null());

    let err = sb
        .update("Page", &id_of(&c), json!({"fk_template": c["pk_page"]}))
        .unwrap_err();
    assert_eq!(err, SandboxError::Raised("cyclic_template".to_string()));
}

/// SCENARIO: The sixth link of a chain exceeds the default depth of five
#[test]
fn scenario_template_depth_limited() {
    let mut sb = sandbox("catalog");
    let mut previous = page(&mut sb, json!({"layout": "root"}), None);
    for _ in 0..5 {
        previous = page(&mut sb, json!({}), Some(&previous));
    }
    assert_eq!(
        sb.resolve_template("Page", &id_of(&previous)).unwrap()["layout"],
        json!("root")
    );

    let err = sb
        .insert("Page", json!({"fk_template": previous["pk_page"]}))
        .unwrap_err();
    assert_eq!(err, SandboxError::Raised("template_depth_exceeded".to_string()));
    assert_eq!(sb.rows("Page").len(), 6);
}
