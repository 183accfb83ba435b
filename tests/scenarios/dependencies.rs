//! Scenario: Tasks depending on other tasks
//!
//! Journey: Tasks form dependency chains; asking for a task's
//! dependencies returns everything it transitively waits on.
//!
//! Success Criteria:
//! - The closure excludes the task itself and is sorted
//! - Under the reject policy a cyclic link is refused
//! - Under the allow policy cycles are stored and the closure still ends
//! - Through a link entity a feature may require several others and a
//!   shared requirement appears once

use serde_json::{json, Value};
use strata::sandbox::{Row, SandboxError};
use strata::Sandbox;

use crate::common::*;

fn task(sb: &mut Sandbox, entity: &str, link: &str, after: Option<&Row>) -> Row {
    let pk = match entity {
        "Task" => "pk_task",
        _ => "pk_step",
    };
    let mut values = json!({"label": "work"});
    if let Some(after) = after {
        values[link] = after[pk].clone();
    }
    sb.insert(entity, values).unwrap()
}

/// SCENARIO: Transitive dependencies of a task
#[test]
fn scenario_dependency_closure() {
    let mut sb = sandbox("catalog");
    let first = task(&mut sb, "Task", "fk_depends_on", None);
    let second = task(&mut sb, "Task", "fk_depends_on", Some(&first));
    let third = task(&mut sb, "Task", "fk_depends_on", Some(&second));

    assert_eq!(
        sb.dependencies("Task", &id_of(&third)).unwrap(),
        vec![id_of(&first), id_of(&second)]
    );
    assert!(sb.dependencies("Task", &id_of(&first)).unwrap().is_empty());
}

/// SCENARIO: Closing a dependency loop is rejected
#[test]
fn scenario_dependency_cycle_rejected() {
    let mut sb = sandbox("catalog");
    let first = task(&mut sb, "Task", "fk_depends_on", None);
    let second = task(&mut sb, "Task", "fk_depends_on", Some(&first));
    let third = task(&mut sb, "Task", "fk_depends_on", Some(&second));

    let err = sb
        .update("Task", &id_of(&first), json!({"fk_depends_on": third["pk_task"]}))
        .unwrap_err();
    assert_eq!(err, SandboxError::Raised("cyclic_dependency".to_string()));
    assert_eq!(sb.row("Task", &id_of(&first)).unwrap()["fk_depends_on"], Value::Null);
}

/// SCENARIO: With cycles allowed, the closure stops where it started
#[test]
fn scenario_dependency_cycle_allowed() {
    let mut sb = sandbox("catalog");
    let first = task(&mut sb, "Step", "fk_after", None);
    let second = task(&mut sb, "Step", "fk_after", Some(&first));
    sb.update("Step", &id_of(&first), json!({"fk_after": second["pk_step"]}))
        .unwrap();

    assert_eq!(sb.dependencies("Step", &id_of(&first)).unwrap(), vec![id_of(&second)]);
    assert_eq!(sb.dependencies("Step", &id_of(&second)).unwrap(), vec![id_of(&first)]);
}

fn feature(sb: &mut Sandbox, title: &str) -> Row {
    sb.insert("Feature", json!({"title": title})).unwrap()
}

fn require(sb: &mut Sandbox, from: &Row, to: &Row) -> Result<Row, SandboxError> {
    sb.insert(
        "FeatureRequirement",
        json!({"fk_feature": from["pk_feature"], "fk_requires": to["pk_feature"]}),
    )
}

/// SCENARIO: Requirements form a diamond
#[test]
fn scenario_dependency_diamond() {
    let mut sb = sandbox("catalog");
    let a = feature(&mut sb, "checkout");
    let b = feature(&mut sb, "cart");
    let c = feature(&mut sb, "payments");
    let d = feature(&mut sb, "accounts");
    for (from, to) in [(&a, &b), (&a, &c), (&b, &d), (&c, &d)] {
        require(&mut sb, from, to).unwrap();
    }

    let mut expected = vec![id_of(&b), id_of(&c), id_of(&d)];
    expected.sort();
    assert_eq!(sb.dependencies("Feature", &id_of(&a)).unwrap(), expected);
    assert_eq!(sb.dependencies("Feature", &id_of(&b)).unwrap(), vec![id_of(&d)]);
    assert!(sb.dependencies("Feature", &id_of(&d)).unwrap().is_empty());
}

/// SCENARIO: A requirement edge that closes a loop is refused
#[test]
fn scenario_dependency_diamond_cycle_rejected() {
    let mut sb = sandbox("catalog");
    let a = feature(&mut sb, "checkout");
    let b = feature(&mut sb, "cart");
    let c = feature(&mut sb, "payments");
    let d = feature(&mut sb, "accounts");
    for (from, to) in [(&a, &b), (&a, &c), (&b, &d), (&c, &d)] {
        require(&mut sb, from, to).unwrap();
    }

    let err = require(&mut sb, &d, &a).unwrap_err();
    assert_eq!(err, SandboxError::Raised("cyclic_dependency".to_string()));
    let err = require(&mut sb, &a, &a).unwrap_err();
    assert_eq!(err, SandboxError::Raised("cyclic_dependency".to_string()));
    assert_eq!(sb.rows("FeatureRequirement").len(), 4);

    // A second path to an existing requirement is not a cycle.
    require(&mut sb, &b, &c).unwrap();
    assert_eq!(sb.dependencies("Feature", &id_of(&b)).unwrap().len(), 2);
}
