//! Materialized aggregate view over one entity's table.
//!
//! ```yaml
//! - name: aggregate_view
//!   config:
//!     group_by: [customer]
//!     aggregates:
//!       - {function: count}
//!       - {function: sum, field: total, alias: revenue}
//!     refresh: on_write   # or "manual" (default)
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{ConfigReader, Fragment, PatternContext, PatternError};
use crate::domain::actions::{Routine, RoutineBody, RoutineKind};
use crate::domain::entities::{Aggregate, AggregateFunction, Entity, Origin, RowPredicate, View, DELETED_AT};

pub const NAME: &str = "aggregate_view";

#[derive(Debug, Deserialize)]
struct AggregateSpec {
    function: AggregateFunction,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    alias: Option<String>,
}

pub(super) fn expand(
    entity: &Entity,
    config: &mut ConfigReader<'_>,
    ctx: &PatternContext<'_>,
) -> Result<Fragment, PatternError> {
    let group_by = config.strings("group_by")?.unwrap_or_default();
    let specs: Vec<AggregateSpec> = config.parse("aggregates")?.unwrap_or_default();
    let refresh = config.choice("refresh", &["manual", "on_write"], "manual")?;
    let name = config
        .string("name")?
        .unwrap_or_else(|| format!("{}{}_agg", ctx.settings.view_prefix, entity.snake_name()));

    if specs.is_empty() {
        return Err(config.invalid("aggregates", "at least one aggregate is required"));
    }
    for column in &group_by {
        if entity.field(column).is_none() {
            return Err(config.invalid("group_by", format!("no field '{}'", column)));
        }
    }

    let mut aggregates = Vec::new();
    for spec in specs {
        let column = match (&spec.field, spec.function) {
            (None, AggregateFunction::Count) => None,
            (None, f) => {
                return Err(config.invalid(
                    "aggregates",
                    format!("{} needs a field", f.as_str()),
                ))
            }
            (Some(name), f) => {
                let field = entity
                    .field(name)
                    .ok_or_else(|| config.invalid("aggregates", format!("no field '{}'", name)))?;
                if matches!(f, AggregateFunction::Sum | AggregateFunction::Avg) && !field.kind.is_numeric() {
                    return Err(config.invalid(
                        "aggregates",
                        format!("{} of non-numeric field '{}'", f.as_str(), name),
                    ));
                }
                Some(name.clone())
            }
        };
        let alias = spec.alias.unwrap_or_else(|| match &column {
            Some(c) => format!("{}_{}", spec.function.as_str(), c),
            None => spec.function.as_str().to_string(),
        });
        if group_by.contains(&alias) || aggregates.iter().any(|a: &Aggregate| a.alias == alias) {
            return Err(config.invalid("aggregates", format!("duplicate column '{}'", alias)));
        }
        aggregates.push(Aggregate {
            function: spec.function,
            column,
            alias,
        });
    }

    let origin = Origin::Pattern(NAME.to_string());
    let qualified = entity.qualified(&name);
    let mut fragment = Fragment::default();
    fragment.views.push(View {
        name: name.clone(),
        group_by,
        aggregates,
        predicate: ctx
            .settings
            .soft_delete_enabled()
            .then(|| RowPredicate::IsNull(DELETED_AT.to_string())),
        origin: origin.clone(),
    });
    fragment.routines.push(
        Routine::generated(
            entity,
            ctx.settings,
            format!("refresh_{}", name),
            RoutineKind::Function,
            RoutineBody::RefreshView(qualified.clone()),
            origin.clone(),
        )
        .with_description(format!("Recompute {}", qualified)),
    );
    if refresh == "on_write" {
        fragment.routines.push(
            Routine::generated(
                entity,
                ctx.settings,
                format!("refresh_{}_on_write", name),
                RoutineKind::Trigger,
                RoutineBody::RefreshView(qualified.clone()),
                origin,
            )
            .with_description(format!("Recompute {} after writes to {}", qualified, entity.name())),
        );
    }
    Ok(fragment)
}

/// Order two JSON scalars of the same kind; `None` for mixed or
/// non-scalar values.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Compute the view's rows, grouped and ordered by the group-by values.
pub fn aggregate(rows: &[&Map<String, Value>], view: &View) -> Vec<Map<String, Value>> {
    let mut groups: BTreeMap<String, (Vec<Value>, Vec<&Map<String, Value>>)> = BTreeMap::new();
    for row in rows {
        let key: Vec<Value> = view
            .group_by
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect();
        let sort_key = serde_json::to_string(&key).unwrap_or_default();
        groups.entry(sort_key).or_insert_with(|| (key, Vec::new())).1.push(row);
    }

    groups
        .into_values()
        .map(|(key, members)| {
            let mut out: Map<String, Value> = view.group_by.iter().cloned().zip(key).collect();
            for agg in &view.aggregates {
                let values: Vec<&Value> = match &agg.column {
                    None => Vec::new(),
                    Some(c) => members
                        .iter()
                        .filter_map(|r| r.get(c))
                        .filter(|v| !v.is_null())
                        .collect(),
                };
                let numbers = || values.iter().filter_map(|v| v.as_f64());
                let result = match agg.function {
                    AggregateFunction::Count => match agg.column {
                        None => Value::from(members.len()),
                        Some(_) => Value::from(values.len()),
                    },
                    AggregateFunction::Sum if values.is_empty() => Value::Null,
                    AggregateFunction::Sum => number(numbers().sum()),
                    AggregateFunction::Avg if values.is_empty() => Value::Null,
                    AggregateFunction::Avg => number(numbers().sum::<f64>() / values.len() as f64),
                    AggregateFunction::Min => extreme(&values, Ordering::Less),
                    AggregateFunction::Max => extreme(&values, Ordering::Greater),
                };
                out.insert(agg.alias.clone(), result);
            }
            out
        })
        .collect()
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    values
        .iter()
        .copied()
        .reduce(|best, v| {
            if compare_values(v, best) == Some(wanted) {
                v
            } else {
                best
            }
        })
        .cloned()
        .unwrap_or(Value::Null)
}
