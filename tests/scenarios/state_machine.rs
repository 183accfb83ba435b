//! Scenario: Approving a purchase request
//!
//! Journey: A request moves from draft or pending to approved, but only
//! while its amount fits the budget.
//!
//! Success Criteria:
//! - Transitions from states outside the allowed set fail with `invalid_transition`
//! - A failing guard is reported by name and changes nothing, also when
//!   it declares its own error code
//! - A successful transition sets the state and stamps `approved_at`

use serde_json::json;
use strata::{CompilePipeline, Sandbox};

use crate::common::*;

const ENTITY: &str = "PurchaseRequest";
const APPROVE: &str = "transition_to_approved";

fn request(sb: &mut Sandbox, status: &str, amount: i64, budget: i64) -> String {
    let row = sb
        .insert(ENTITY, json!({"status": status, "amount": amount, "budget": budget}))
        .unwrap();
    id_of(&row)
}

/// SCENARIO: A cancelled request cannot be approved
#[test]
fn scenario_transition_from_disallowed_state() {
    let mut sb = sandbox("purchasing");
    let id = request(&mut sb, "cancelled", 50, 100);

    let result = sb.invoke(ENTITY, APPROVE, Some(&id), json!({})).unwrap();

    assert_eq!(result.error_code(), Some("invalid_transition"));
    assert_eq!(sb.row(ENTITY, &id).unwrap()["status"], json!("cancelled"));
}

/// SCENARIO: A pending request over budget names the failing guard
#[test]
fn scenario_guard_blocks_transition() {
    let mut sb = sandbox("purchasing");
    let id = request(&mut sb, "pending", 150, 100);

    let result = sb.invoke(ENTITY, APPROVE, Some(&id), json!({})).unwrap();

    assert_eq!(result.error_code(), Some("budget_available"));
    assert_eq!(result.guard(), Some("budget_available"));
    let row = sb.row(ENTITY, &id).unwrap();
    assert_eq!(row["status"], json!("pending"));
    assert!(row["approved_at"].is_null());
}

/// SCENARIO: A guard with its own error code still names itself
#[test]
fn scenario_guard_with_error_code_blocks_transition() {
    let mut spec = bundle("purchasing");
    spec.entities[0].guards[0].error = Some("over_budget".to_string());
    let output = CompilePipeline::default().run(&spec).unwrap();
    let mut sb = Sandbox::from_output(&output);
    let id = request(&mut sb, "pending", 150, 100);

    let result = sb.invoke(ENTITY, APPROVE, Some(&id), json!({})).unwrap();

    assert_eq!(result.error_code(), Some("over_budget"));
    assert_eq!(result.guard(), Some("budget_available"));
    assert_eq!(sb.row(ENTITY, &id).unwrap()["status"], json!("pending"));

    let script = output.script(strata::Target::Postgres);
    assert!(script.contains("MESSAGE = 'over_budget', HINT = 'budget_available';"));
}

/// SCENARIO: A pending request within budget is approved
#[test]
fn scenario_transition_succeeds() {
    let mut sb = sandbox("purchasing");
    let id = request(&mut sb, "pending", 80, 100);

    let result = sb.invoke(ENTITY, APPROVE, Some(&id), json!({})).unwrap();

    assert!(result.is_success(), "{:?}", result);
    assert_eq!(result.field("status"), Some(&json!("approved")));
    let row = sb.row(ENTITY, &id).unwrap();
    assert_eq!(row["status"], json!("approved"));
    assert!(row["approved_at"].is_string());

    // Approved is not a source state.
    let again = sb.invoke(ENTITY, APPROVE, Some(&id), json!({})).unwrap();
    assert_eq!(again.error_code(), Some("invalid_transition"));
}
