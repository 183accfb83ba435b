//! Validation predicates attached to scalar types.

use regex::Regex;
use serde_json::Value;

/// Closed set of value rules a scalar type can carry.
///
/// Rules also become CHECK constraints on columns of that type, so they are
/// kept as data rather than closures.
#[derive(Debug, Clone, Default)]
pub enum ValuePredicate {
    #[default]
    Any,
    Pattern(Regex),
    /// Inclusive numeric bounds.
    Range { min: Option<f64>, max: Option<f64> },
    OneOf(Vec<String>),
}

impl PartialEq for ValuePredicate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValuePredicate::Any, ValuePredicate::Any) => true,
            (ValuePredicate::Pattern(a), ValuePredicate::Pattern(b)) => a.as_str() == b.as_str(),
            (
                ValuePredicate::Range { min: a, max: b },
                ValuePredicate::Range { min: c, max: d },
            ) => a == c && b == d,
            (ValuePredicate::OneOf(a), ValuePredicate::OneOf(b)) => a == b,
            _ => false,
        }
    }
}

impl ValuePredicate {
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(ValuePredicate::Pattern)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, ValuePredicate::Any)
    }

    /// Apply the rule to a value whose shape has already been checked.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            ValuePredicate::Any => Ok(()),
            ValuePredicate::Pattern(re) => match value.as_str() {
                Some(s) if re.is_match(s) => Ok(()),
                Some(s) => Err(format!("'{}' does not match {}", s, re.as_str())),
                None => Err("expected a string".to_string()),
            },
            ValuePredicate::Range { min, max } => {
                let n = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse::<f64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| "expected a number".to_string())?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{} is below the minimum {}", n, min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{} is above the maximum {}", n, max));
                    }
                }
                Ok(())
            }
            ValuePredicate::OneOf(values) => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(()),
                Some(s) => Err(format!("'{}' is not one of [{}]", s, values.join(", "))),
                None => Err("expected a string".to_string()),
            },
        }
    }
}
