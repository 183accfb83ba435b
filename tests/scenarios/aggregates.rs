//! Scenario: Reporting revenue per customer
//!
//! Journey: Invoices feed a summary view kept fresh on every write;
//! payments feed one refreshed on demand.
//!
//! Success Criteria:
//! - On-write views follow inserts, updates and deletes
//! - Manual views change only when their refresh routine runs
//! - Deleted rows are left out

use serde_json::{json, Value};
use strata::Sandbox;

use crate::common::*;

fn view(sb: &Sandbox, name: &str) -> Vec<Value> {
    sb.view_rows(name)
        .expect("view exists")
        .iter()
        .cloned()
        .map(Value::Object)
        .collect()
}

/// SCENARIO: Revenue per customer follows every write
#[test]
fn scenario_view_refreshed_on_write() {
    let mut sb = sandbox("customers");
    assert!(view(&sb, "mv_invoice_agg").is_empty());

    sb.insert("Invoice", json!({"customer": "acme", "total": 10})).unwrap();
    sb.insert("Invoice", json!({"customer": "acme", "total": 20})).unwrap();
    let globex = sb
        .insert("Invoice", json!({"customer": "globex", "total": 5}))
        .unwrap();

    assert_eq!(
        view(&sb, "mv_invoice_agg"),
        vec![
            json!({"customer": "acme", "count": 2, "revenue": 30}),
            json!({"customer": "globex", "count": 1, "revenue": 5}),
        ]
    );

    let now = sb.now();
    sb.update("Invoice", &id_of(&globex), json!({"deleted_at": now}))
        .unwrap();
    assert_eq!(
        view(&sb, "billing.mv_invoice_agg"),
        vec![json!({"customer": "acme", "count": 2, "revenue": 30})]
    );
}

/// SCENARIO: A manual view waits for its refresh
#[test]
fn scenario_view_refreshed_on_demand() {
    let mut sb = sandbox("customers");
    sb.insert("Payment", json!({"amount": 10})).unwrap();
    sb.insert("Payment", json!({"amount": 30})).unwrap();

    assert!(view(&sb, "mv_payment_agg").is_empty());

    sb.call("Payment", "refresh_mv_payment_agg", None, json!({}))
        .unwrap();

    assert_eq!(
        view(&sb, "mv_payment_agg"),
        vec![json!({"count": 2, "max_amount": 30})]
    );
}
