//! State-machine transition.
//!
//! ```yaml
//! - name: state_machine
//!   config:
//!     state_field: status          # default "status"
//!     from_states: [draft, pending]
//!     to_state: approved
//!     guards: [budget_available, {name: has_lines, condition: "line_count > 0"}]
//!     action: approve              # default "transition_to_<to_state>"
//!     timestamp_field: approved_at # default "<to_state>_at"
//! ```
//!
//! Generates one action: reject unless the current state is listed, run
//! the guards in order, then set the new state and its timestamp.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{quote, ConfigReader, Fragment, PatternContext, PatternError};
use crate::domain::entities::{Action, ActionInput, Entity, Field, Guard, Origin, Step};
use crate::domain::types::{PrimitiveKind, TargetType};

pub const NAME: &str = "state_machine";

/// Error code of the generated state check.
pub const INVALID_TRANSITION: &str = "invalid_transition";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GuardRef {
    Named(String),
    Inline(Guard),
}

pub(super) fn expand(
    entity: &Entity,
    config: &mut ConfigReader<'_>,
    _ctx: &PatternContext<'_>,
) -> Result<Fragment, PatternError> {
    let state_field = config.string("state_field")?.unwrap_or_else(|| "status".to_string());
    let from_states = config.required_strings("from_states")?;
    let to_state = config.required_string("to_state")?;
    let guard_refs: Vec<GuardRef> = config.parse("guards")?.unwrap_or_default();
    let inputs: Vec<ActionInput> = config.parse("inputs")?.unwrap_or_default();
    let action_name = config
        .string("action")?
        .unwrap_or_else(|| format!("transition_to_{}", to_state));
    let timestamp_field = config
        .string("timestamp_field")?
        .unwrap_or_else(|| format!("{}_at", to_state));

    let state = entity
        .field(&state_field)
        .ok_or_else(|| config.invalid("state_field", format!("no field '{}'", state_field)))?;
    if state.kind != PrimitiveKind::Text {
        return Err(config.invalid("state_field", format!("'{}' is not a text field", state_field)));
    }
    if let Some(values) = &state.enum_values {
        for s in from_states.iter().chain(std::iter::once(&to_state)) {
            if !values.contains(s) {
                return Err(config.invalid(
                    if *s == to_state { "to_state" } else { "from_states" },
                    format!("'{}' is not a value of '{}'", s, state_field),
                ));
            }
        }
    }

    let mut fragment = Fragment::default();
    let origin = Origin::Pattern(NAME.to_string());

    match entity.field(&timestamp_field) {
        Some(existing) if matches!(existing.kind, PrimitiveKind::Timestamp | PrimitiveKind::Date) => {}
        Some(_) => {
            return Err(config.invalid(
                "timestamp_field",
                format!("'{}' exists and is not a timestamp", timestamp_field),
            ))
        }
        None => fragment.fields.push(
            Field::new(&timestamp_field, "timestamp", PrimitiveKind::Timestamp, TargetType::new("TIMESTAMPTZ"))
                .with_origin(origin.clone()),
        ),
    }

    let list = from_states.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", ");
    let mut steps = vec![Step::Validate {
        condition: Some(format!("{} in ({})", state_field, list)),
        guard: None,
        error: Some(INVALID_TRANSITION.to_string()),
    }];

    for guard in guard_refs {
        let name = match guard {
            GuardRef::Named(name) => {
                if entity.guard(&name).is_none() {
                    return Err(config.invalid("guards", format!("no guard named '{}'", name)));
                }
                name
            }
            GuardRef::Inline(guard) => {
                let name = guard.name.clone();
                fragment.guards.push(guard);
                name
            }
        };
        steps.push(Step::guard(&name));
    }

    steps.push(Step::Update {
        entity: None,
        set: BTreeMap::from([
            (state_field, quote(&to_state)),
            (timestamp_field, "now()".to_string()),
        ]),
        filter: None,
    });

    let mut action = Action::new(action_name, steps).with_inputs(inputs).with_origin(origin);
    action.description = Some(format!(
        "Transition {} from {} to {}",
        entity.name(),
        from_states.join("/"),
        to_state
    ));
    fragment.actions.push(action);
    Ok(fragment)
}
