//! Scenario: Working an order through its actions
//!
//! Journey: A clerk adds lines to an order, reviews it and sends it.
//!
//! Success Criteria:
//! - An action that fails part way leaves no write behind
//! - Actions may write other entities and reference their own row
//! - Guards report their declared error code

use serde_json::json;
use strata::Target;

use crate::common::*;

/// SCENARIO: [update X, validate false, update Y] changes neither X nor Y
#[test]
fn scenario_action_is_all_or_nothing() {
    let mut sb = sandbox("sales");
    let order = id_of(&sb.insert("Order", json!({"total": 5})).unwrap());
    let before = sb.row("Order", &order).unwrap().clone();

    let result = sb.invoke("Order", "review", Some(&order), json!({})).unwrap();

    assert_eq!(result.error_code(), Some("review_blocked"));
    let after = sb.row("Order", &order).unwrap();
    assert!(after["note"].is_null());
    assert_eq!(after["reviewed"], json!(false));
    assert_eq!(after, &before);
}

/// SCENARIO: Adding a line inserts into another table, linked to this order
#[test]
fn scenario_action_inserts_related_row() {
    let mut sb = sandbox("sales");
    let order = sb.insert("Order", json!({"total": 5})).unwrap();

    let result = sb
        .invoke("Order", "add_line", Some(&id_of(&order)), json!({"qty": 3}))
        .unwrap();

    assert!(result.is_success(), "{:?}", result);
    let lines = sb.rows("OrderLine");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["qty"], json!(3));
    assert_eq!(lines[0]["fk_order"], order["pk_order"]);
}

/// SCENARIO: A guard failing after an insert undoes the insert
#[test]
fn scenario_guard_failure_undoes_earlier_steps() {
    let mut sb = sandbox("sales");
    let order = id_of(&sb.insert("Order", json!({"total": 0})).unwrap());

    let result = sb
        .invoke("Order", "add_line", Some(&order), json!({"qty": 3}))
        .unwrap();

    assert_eq!(result.error_code(), Some("empty_order"));
    assert!(sb.rows("OrderLine").is_empty());
}

/// SCENARIO: Sending an order notifies listeners once
#[test]
fn scenario_send_notifies() {
    let mut sb = sandbox("sales");
    let order = id_of(&sb.insert("Order", json!({"total": 12})).unwrap());

    assert!(sb.invoke("Order", "send", Some(&order), json!({})).unwrap().is_success());
    let repeat = sb.invoke("Order", "send", Some(&order), json!({})).unwrap();

    assert_eq!(repeat.error_code(), Some("not_draft"));
    assert_eq!(sb.notifications().len(), 1);
    assert_eq!(sb.notifications()[0].channel, "order_sent");
}

/// SCENARIO: The generated script wraps each action in one transaction block
#[test]
fn scenario_action_routine_is_transactional() {
    let output = compile("sales");
    let script = output.script(Target::Postgres);

    assert!(script.contains("CREATE OR REPLACE FUNCTION sales.review("));
    assert!(script.contains("MESSAGE = 'review_blocked';"));
    assert!(script.contains("WHEN integrity_constraint_violation THEN"));

    let routine = output.position("routine:sales.add_line").unwrap();
    let lines = output.position("table:sales.tb_order_line").unwrap();
    assert!(routine > lines);
}
