//! Non-overlapping ranges within a scope.
//!
//! ```yaml
//! - name: non_overlapping_range
//!   config:
//!     scope_fields: [room]
//!     start_field: starts_on
//!     end_field: ends_on
//!     nullable_end: true     # null end means open-ended
//!     check_mode: strict     # or "warning"
//!     bounds: "[)"           # or "[]"
//! ```
//!
//! Both modes add a stored range column with a GiST index and a
//! `start <= end` check. `strict` rejects overlapping writes with an
//! exclusion constraint; `warning` keeps the write and sets a flag column
//! from a trigger.

use std::cmp::Ordering;

use super::{ConfigReader, Fragment, PatternContext, PatternError};
use crate::domain::actions::{RangeSpec, Routine, RoutineBody, RoutineKind};
use crate::domain::entities::{
    CheckRule, ColumnDefault, ComputedRange, Constraint, ConstraintRule, Entity, ExclusionElement,
    Field, FieldRole, Index, IndexMethod, Origin, RowPredicate, DELETED_AT,
};
use crate::domain::types::{PrimitiveKind, TargetType};
use crate::domain::value_objects::Diagnostic;

pub const NAME: &str = "non_overlapping_range";

/// Column type of the stored range for a bound kind.
pub fn range_type(kind: PrimitiveKind) -> Option<&'static str> {
    match kind {
        PrimitiveKind::Date => Some("daterange"),
        PrimitiveKind::Timestamp => Some("tstzrange"),
        PrimitiveKind::Integer => Some("int4range"),
        PrimitiveKind::BigInt => Some("int8range"),
        PrimitiveKind::Decimal => Some("numrange"),
        _ => None,
    }
}

pub(super) fn expand(
    entity: &Entity,
    config: &mut ConfigReader<'_>,
    ctx: &PatternContext<'_>,
) -> Result<Fragment, PatternError> {
    let scope = config.required_strings("scope_fields")?;
    let start_key = config.alias(&["start_field", "start_date_field"]);
    let start = config.required_string(start_key)?;
    let end_key = config.alias(&["end_field", "end_date_field"]);
    let end = config.required_string(end_key)?;
    let mode_key = config.alias(&["check_mode", "mode"]);
    let mode = config.choice(mode_key, &["strict", "warning"], "strict")?;
    let bounds_key = config.alias(&["bounds", "inclusive_bounds"]);
    let bounds = config.choice(bounds_key, &["[)", "[]"], "[)")?;

    for column in &scope {
        if entity.field(column).is_none() {
            return Err(config.invalid("scope_fields", format!("no field '{}'", column)));
        }
    }
    let start_field = entity
        .field(&start)
        .ok_or_else(|| config.invalid(start_key, format!("no field '{}'", start)))?;
    let end_field = entity
        .field(&end)
        .ok_or_else(|| config.invalid(end_key, format!("no field '{}'", end)))?;
    if start_field.kind != end_field.kind {
        return Err(config.invalid(
            end_key,
            format!("'{}' and '{}' have different types", start, end),
        ));
    }
    let range_type = range_type(start_field.kind).ok_or_else(|| {
        config.invalid(
            start_key,
            format!("'{}' cannot bound a range ({})", start, start_field.kind.as_str()),
        )
    })?;
    let nullable_end = config.bool("nullable_end")?.unwrap_or(end_field.nullable);

    let origin = Origin::Pattern(NAME.to_string());
    let table = entity.table_name();
    let range_column = format!("{}_{}_range", start, end);
    let mut fragment = Fragment::default();

    fragment.fields.push(
        Field::new(&range_column, "range", PrimitiveKind::Range, TargetType::new(range_type))
            .with_role(FieldRole::ComputedRange(ComputedRange {
                range_type: range_type.to_string(),
                start: start.clone(),
                end: end.clone(),
                bounds: bounds.clone(),
            }))
            .with_origin(origin.clone()),
    );
    fragment.indexes.push(Index {
        name: format!("idx_{}_{}", table, range_column),
        columns: vec![range_column.clone()],
        method: IndexMethod::Gist,
        unique: false,
        predicate: None,
        origin: origin.clone(),
    });
    fragment.constraints.push(Constraint {
        name: format!("chk_{}_{}_{}_order", table, start, end),
        rule: ConstraintRule::Check(CheckRule::Ordered {
            start: start.clone(),
            end: end.clone(),
            allow_equal: bounds == "[]",
        }),
        origin: origin.clone(),
    });
    if !nullable_end && end_field.nullable {
        fragment.constraints.push(Constraint {
            name: format!("chk_{}_{}_not_null", table, end),
            rule: ConstraintRule::Check(CheckRule::NotNull { column: end.clone() }),
            origin: origin.clone(),
        });
    }

    let live_rows = ctx
        .settings
        .soft_delete_enabled()
        .then(|| RowPredicate::IsNull(DELETED_AT.to_string()));

    if mode == "strict" {
        let mut elements: Vec<ExclusionElement> =
            scope.iter().map(|c| ExclusionElement::new(c, "=")).collect();
        elements.push(ExclusionElement::new(&range_column, "&&"));
        fragment.constraints.push(Constraint {
            name: format!("excl_{}_{}_{}", table, start, end),
            rule: ConstraintRule::Exclusion {
                elements,
                predicate: live_rows,
            },
            origin,
        });
    } else {
        let flag_column = format!("{}_{}_overlap", start, end);
        fragment.fields.push(
            Field::new(&flag_column, "boolean", PrimitiveKind::Boolean, TargetType::new("BOOLEAN"))
                .required()
                .with_default(ColumnDefault::Literal(serde_json::Value::Bool(false)))
                .with_role(FieldRole::Derived)
                .with_origin(origin.clone()),
        );
        fragment.routines.push(
            Routine::generated(
                entity,
                ctx.settings,
                format!("flag_{}_{}_{}_overlap", entity.snake_name(), start, end),
                RoutineKind::Trigger,
                RoutineBody::FlagOverlap(RangeSpec {
                    scope_columns: scope.clone(),
                    start: start.clone(),
                    end: end.clone(),
                    range_column: range_column.clone(),
                    range_type: range_type.to_string(),
                    bounds,
                    flag_column: flag_column.clone(),
                }),
                origin,
            )
            .with_description(format!("Flag overlapping {} ranges on {}", range_column, entity.name())),
        );
        fragment.diagnostics.push(Diagnostic::info(
            "overlap-flagged",
            format!(
                "{}: overlapping {}..{} ranges are kept and marked in '{}'",
                entity.name(),
                start,
                end,
                flag_column
            ),
        ));
    }

    Ok(fragment)
}

/// One range; `None` bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<T> {
    pub start: Option<T>,
    pub end: Option<T>,
}

impl<T: Ord> Span<T> {
    pub fn new(start: Option<T>, end: Option<T>) -> Self {
        Self { start, end }
    }

    /// Whether two spans share a point. With `[)` bounds adjacent spans
    /// do not overlap; with `[]` they do.
    pub fn overlaps(&self, other: &Span<T>, inclusive_end: bool) -> bool {
        starts_before_end(self.start.as_ref(), other.end.as_ref(), inclusive_end)
            && starts_before_end(other.start.as_ref(), self.end.as_ref(), inclusive_end)
    }

    /// `start <= end` (or `<` when `strict`) for bounded spans.
    pub fn is_ordered(&self, strict: bool) -> bool {
        match (&self.start, &self.end) {
            (Some(s), Some(e)) => match s.cmp(e) {
                Ordering::Less => true,
                Ordering::Equal => !strict,
                Ordering::Greater => false,
            },
            _ => true,
        }
    }
}

fn starts_before_end<T: Ord>(start: Option<&T>, end: Option<&T>, inclusive_end: bool) -> bool {
    match (start, end) {
        (Some(s), Some(e)) => {
            if inclusive_end {
                s <= e
            } else {
                s < e
            }
        }
        _ => true,
    }
}
