//! Scenario: Booking rooms without double-booking
//!
//! Journey: Bookings of one room may not overlap; shifts of one worker
//! may, but overlapping ones are flagged.
//!
//! Success Criteria:
//! - Strict mode rejects an overlapping range in the same scope
//! - Adjacent half-open ranges, other scopes and deleted rows never conflict
//! - Warning mode accepts the row and sets its overlap flag

use serde_json::json;
use strata::sandbox::SandboxError;
use strata::{Sandbox, Severity};

use crate::common::*;

const EXCLUSION: &str = "excl_tb_booking_starts_on_ends_on";

fn book(sb: &mut Sandbox, room: &str, from: &str, to: Option<&str>) -> Result<String, SandboxError> {
    sb.insert("Booking", json!({"room": room, "starts_on": from, "ends_on": to}))
        .map(|row| id_of(&row))
}

fn violation() -> SandboxError {
    SandboxError::Violation {
        constraint: EXCLUSION.to_string(),
    }
}

/// SCENARIO: Overlapping bookings of one room are rejected, adjacent ones are not
#[test]
fn scenario_strict_range_rejects_overlap() {
    let mut sb = sandbox("bookings");

    book(&mut sb, "101", "2024-01-01", Some("2024-01-10")).unwrap();
    assert_eq!(
        book(&mut sb, "101", "2024-01-05", Some("2024-01-15")).unwrap_err(),
        violation()
    );
    book(&mut sb, "101", "2024-01-10", Some("2024-01-20")).unwrap();
    book(&mut sb, "102", "2024-01-05", Some("2024-01-15")).unwrap();

    assert_eq!(sb.rows("Booking").len(), 3);
    assert_eq!(sb.rows("Booking")[0]["starts_on_ends_on_range"], json!("[2024-01-01,2024-01-10)"));
}

/// SCENARIO: An open-ended booking blocks everything after its start
#[test]
fn scenario_open_end_extends_forever() {
    let mut sb = sandbox("bookings");

    book(&mut sb, "201", "2024-02-01", None).unwrap();
    assert_eq!(
        book(&mut sb, "201", "2030-01-01", Some("2030-01-02")).unwrap_err(),
        violation()
    );
    book(&mut sb, "201", "2024-01-01", Some("2024-02-01")).unwrap();
}

/// SCENARIO: Deleting a booking frees its slot
#[test]
fn scenario_deleted_booking_no_longer_conflicts() {
    let mut sb = sandbox("bookings");
    let first = book(&mut sb, "301", "2024-03-01", Some("2024-03-05")).unwrap();

    let now = sb.now();
    sb.update("Booking", &first, json!({"deleted_at": now})).unwrap();

    book(&mut sb, "301", "2024-03-02", Some("2024-03-04")).unwrap();
}

/// SCENARIO: Malformed ranges are refused
#[test]
fn scenario_range_bounds_must_be_ordered() {
    let mut sb = sandbox("bookings");

    let reversed = book(&mut sb, "401", "2024-05-10", Some("2024-05-01")).unwrap_err();
    assert!(matches!(reversed, SandboxError::Data(_)), "{:?}", reversed);

    let empty = book(&mut sb, "401", "2024-05-01", Some("2024-05-01")).unwrap_err();
    assert_eq!(
        empty,
        SandboxError::Violation {
            constraint: "chk_tb_booking_starts_on_ends_on_order".to_string()
        }
    );
    assert!(sb.rows("Booking").is_empty());
}

/// SCENARIO: Overlapping shifts are stored and flagged
#[test]
fn scenario_warning_mode_flags_overlap() {
    let output = compile("bookings");
    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.code == "overlap-flagged" && d.severity == Severity::Info));
    assert!(output.artifact("constraint:ops.excl_tb_booking_starts_on_ends_on").is_some());
    assert!(output.artifact("constraint:ops.excl_tb_shift_starts_at_ends_at").is_none());

    let mut sb = Sandbox::from_output(&output);
    let shift = |sb: &mut Sandbox, worker: &str, from: i64, to: i64| {
        sb.insert("Shift", json!({"worker": worker, "starts_at": from, "ends_at": to}))
            .unwrap()["starts_at_ends_at_overlap"]
            .clone()
    };

    assert_eq!(shift(&mut sb, "ana", 1, 5), json!(false));
    // Closed bounds: sharing the end point is an overlap.
    assert_eq!(shift(&mut sb, "ana", 5, 8), json!(true));
    assert_eq!(shift(&mut sb, "ana", 9, 10), json!(false));
    assert_eq!(shift(&mut sb, "ben", 1, 5), json!(false));
    assert_eq!(sb.rows("Shift").len(), 4);
}
