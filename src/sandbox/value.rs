//! SQL value semantics over JSON values.
//!
//! NULL propagates through comparison and arithmetic, logic is
//! three-valued, and a CHECK holds unless it evaluates to false.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use super::{Row, SandboxError};
use crate::domain::actions::BinaryOp;
use crate::domain::entities::{CheckRule, ComputedRange, RowPredicate};
use crate::domain::patterns::aggregate_view::compare_values;
use crate::domain::patterns::non_overlapping_range::Span;

/// `true`, `false` or unknown.
pub(super) fn truth(value: &Value) -> Result<Option<bool>, SandboxError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(SandboxError::Data(format!("{} is not a boolean", other))),
    }
}

pub(super) fn from_truth(value: Option<bool>) -> Value {
    value.map_or(Value::Null, Value::Bool)
}

/// Order two non-null values; numbers compare by value.
pub(super) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    compare_values(a, b).or_else(|| (a == b).then_some(Ordering::Equal))
}

/// `a = b`, unknown when either side is NULL.
pub(super) fn sql_eq(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    Some(compare(a, b) == Some(Ordering::Equal))
}

/// `a IS NOT DISTINCT FROM b`
pub(super) fn same(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (false, false) => sql_eq(a, b) == Some(true),
        _ => false,
    }
}

pub(super) fn comparison(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, SandboxError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        let equal = sql_eq(a, b) == Some(true);
        return Ok(Value::Bool(equal == (op == BinaryOp::Eq)));
    }
    let ordering = compare(a, b)
        .ok_or_else(|| SandboxError::Data(format!("cannot compare {} with {}", a, b)))?;
    let holds = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return Err(SandboxError::Unsupported(format!("'{}' is not a comparison", op.symbol()))),
    };
    Ok(Value::Bool(holds))
}

pub(super) fn logical(op: BinaryOp, a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match op {
        BinaryOp::And => match (a, b) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (a, b) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    }
}

pub(super) fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, SandboxError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || SandboxError::Data(format!("operator {} does not apply to {} and {}", op.symbol(), a, b));
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div if y == 0 => return Err(SandboxError::Data("division by zero".to_string())),
            BinaryOp::Div => x.checked_div(y),
            _ => return Err(mismatch()),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| SandboxError::Data("integer out of range".to_string()));
    }
    let (x, y) = (a.as_f64().ok_or_else(mismatch)?, b.as_f64().ok_or_else(mismatch)?);
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div if y == 0.0 => return Err(SandboxError::Data("division by zero".to_string())),
        BinaryOp::Div => x / y,
        _ => return Err(mismatch()),
    };
    serde_json::Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| SandboxError::Data(format!("{} is not a finite number", result)))
}

pub(super) fn negate(value: &Value) -> Result<Value, SandboxError> {
    match value {
        Value::Null => Ok(Value::Null),
        v if v.is_i64() => Ok(Value::from(-v.as_i64().unwrap_or_default())),
        v => v
            .as_f64()
            .and_then(|f| serde_json::Number::from_f64(-f))
            .map(Value::Number)
            .ok_or_else(|| SandboxError::Data(format!("cannot negate {}", v))),
    }
}

/// Integer key stored in a column.
pub(super) fn as_pk(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64)
}

pub(super) fn column<'r>(row: &'r Row, name: &str) -> &'r Value {
    row.get(name).unwrap_or(&Value::Null)
}

pub(super) fn matches_predicate(row: &Row, predicate: &RowPredicate) -> bool {
    match predicate {
        RowPredicate::IsNull(c) => column(row, c).is_null(),
        RowPredicate::IsTrue(c) => column(row, c) == &Value::Bool(true),
        RowPredicate::All(all) => all.iter().all(|p| matches_predicate(row, p)),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `column::text`, `None` for NULL.
pub(super) fn column_text(row: &Row, name: &str) -> Option<String> {
    match column(row, name) {
        Value::Null => None,
        other => Some(text(other)),
    }
}

/// Whether a CHECK constraint holds for `row`.
pub(super) fn check_holds(row: &Row, rule: &CheckRule) -> Result<bool, SandboxError> {
    match rule {
        CheckRule::Matches { column: c, pattern } => {
            let value = column(row, c);
            if value.is_null() {
                return Ok(true);
            }
            let regex = Regex::new(pattern)
                .map_err(|e| SandboxError::Data(format!("invalid pattern '{}': {}", pattern, e)))?;
            Ok(regex.is_match(&text(value)))
        }
        CheckRule::Between { column: c, min, max } => {
            let value = column(row, c);
            if value.is_null() {
                return Ok(true);
            }
            let number = value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| SandboxError::Data(format!("{} is not a number", value)))?;
            Ok(min.map_or(true, |m| number >= m) && max.map_or(true, |m| number <= m))
        }
        CheckRule::OneOf { column: c, values } => {
            let value = column(row, c);
            Ok(value.is_null() || values.contains(&text(value)))
        }
        CheckRule::NotNull { column: c } => Ok(!column(row, c).is_null()),
        CheckRule::Ordered {
            start,
            end,
            allow_equal,
        } => {
            let (start, end) = (column(row, start), column(row, end));
            if start.is_null() || end.is_null() {
                return Ok(true);
            }
            let ordering = compare(start, end)
                .ok_or_else(|| SandboxError::Data(format!("cannot compare {} with {}", start, end)))?;
            Ok(ordering == Ordering::Less || (*allow_equal && ordering == Ordering::Equal))
        }
    }
}

/// Total order over JSON values so ranges can reuse [`Span`].
#[derive(Debug, Clone)]
pub(super) struct Ordered(pub Value);

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

impl Ord for Ordered {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0).unwrap_or_else(|| {
            rank(&self.0)
                .cmp(&rank(&other.0))
                .then_with(|| self.0.to_string().cmp(&other.0.to_string()))
        })
    }
}

impl PartialOrd for Ordered {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ordered {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ordered {}

/// A computed range column's value.
#[derive(Debug, Clone)]
pub(super) struct RangeValue {
    span: Span<Ordered>,
    inclusive_end: bool,
}

impl RangeValue {
    /// Range built from `start` and `end` of `row`; NULL bounds are open.
    pub fn of(row: &Row, start: &str, end: &str, bounds: &str) -> Result<Self, SandboxError> {
        let bound = |c: &str| Some(column(row, c)).filter(|v| !v.is_null()).cloned().map(Ordered);
        let span = Span::new(bound(start), bound(end));
        if !span.is_ordered(false) {
            return Err(SandboxError::Data(
                "range lower bound must be less than or equal to range upper bound".to_string(),
            ));
        }
        Ok(Self {
            span,
            inclusive_end: bounds == "[]",
        })
    }

    pub fn computed(row: &Row, range: &ComputedRange) -> Result<Self, SandboxError> {
        Self::of(row, &range.start, &range.end, &range.bounds)
    }

    /// `[x,x)` holds no point.
    pub fn is_empty(&self) -> bool {
        !self.inclusive_end
            && matches!((&self.span.start, &self.span.end), (Some(s), Some(e)) if s == e)
    }

    /// `&&`
    pub fn overlaps(&self, other: &RangeValue) -> bool {
        !self.is_empty() && !other.is_empty() && self.span.overlaps(&other.span, self.inclusive_end)
    }

    /// Canonical text form, as stored.
    pub fn to_text(&self) -> String {
        if self.is_empty() {
            return "empty".to_string();
        }
        let bound = |b: &Option<Ordered>| b.as_ref().map(|o| text(&o.0)).unwrap_or_default();
        format!(
            "[{},{}{}",
            bound(&self.span.start),
            bound(&self.span.end),
            if self.inclusive_end { ']' } else { ')' }
        )
    }
}
