//! Scenario: Keeping the history of customer records
//!
//! Journey: Customer details change over time; every change of a tracked
//! field starts a new version while the old one is closed.
//!
//! Success Criteria:
//! - The first upsert inserts, an identical one changes nothing
//! - A changed tracked field supersedes the current version
//! - Only one current version per natural key can exist

use serde_json::json;
use strata::sandbox::SandboxError;

use crate::common::*;

/// SCENARIO: Insert, repeat, then change a customer
#[test]
fn scenario_type2_versions() {
    let mut sb = sandbox("customers");

    let first = sb
        .upsert_version("Customer", json!({"code": "C1", "name": "Ada", "tier": "silver"}))
        .unwrap();
    assert_eq!(first.message.as_deref(), Some("inserted"));

    let same = sb
        .upsert_version("Customer", json!({"code": "C1", "name": "Ada", "tier": "silver"}))
        .unwrap();
    assert_eq!(same.message.as_deref(), Some("unchanged"));
    assert_eq!(same.id, first.id);
    assert_eq!(sb.rows("Customer").len(), 1);

    let changed = sb
        .upsert_version("Customer", json!({"code": "C1", "tier": "gold"}))
        .unwrap();
    assert_eq!(changed.message.as_deref(), Some("superseded"));
    assert_ne!(changed.id, first.id);

    let rows = sb.rows("Customer");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["is_current"], json!(false));
    assert!(rows[0]["effective_to"].is_string());
    assert_eq!(rows[0]["tier"], json!("silver"));
    assert_eq!(rows[1]["is_current"], json!(true));
    assert!(rows[1]["effective_to"].is_null());
    assert_eq!(rows[1]["name"], json!("Ada"));
    assert_eq!(rows[1]["tier"], json!("gold"));
}

/// SCENARIO: Natural keys version independently
#[test]
fn scenario_type2_keys_are_independent() {
    let mut sb = sandbox("customers");
    sb.upsert_version("Customer", json!({"code": "C1", "name": "Ada"}))
        .unwrap();

    let other = sb
        .upsert_version("Customer", json!({"code": "C2", "name": "Ada"}))
        .unwrap();

    assert_eq!(other.message.as_deref(), Some("inserted"));
    assert!(sb.rows("Customer").iter().all(|r| r["is_current"] == json!(true)));
}

/// SCENARIO: A second current version written directly is refused
#[test]
fn scenario_single_current_version() {
    let mut sb = sandbox("customers");
    sb.upsert_version("Customer", json!({"code": "C1", "name": "Ada"}))
        .unwrap();

    let err = sb.insert("Customer", json!({"code": "C1"})).unwrap_err();
    assert_eq!(
        err,
        SandboxError::Violation {
            constraint: "uk_tb_customer_code_current".to_string()
        }
    );

    sb.insert("Customer", json!({"code": "C1", "is_current": false}))
        .unwrap();
}
