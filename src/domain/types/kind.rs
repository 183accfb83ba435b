//! Primitive kinds and their target-type mapping.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage-level kind every scalar type reduces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Text,
    Integer,
    BigInt,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Time,
    Interval,
    Uuid,
    Json,
    Inet,
    MacAddr,
    /// Computed range values; only produced by patterns, never declared.
    Range,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::Text => "text",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::BigInt => "bigint",
            PrimitiveKind::Decimal => "decimal",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Timestamp => "timestamp",
            PrimitiveKind::Time => "time",
            PrimitiveKind::Interval => "interval",
            PrimitiveKind::Uuid => "uuid",
            PrimitiveKind::Json => "json",
            PrimitiveKind::Inet => "inet",
            PrimitiveKind::MacAddr => "macaddr",
            PrimitiveKind::Range => "range",
        }
    }

    /// Default column type. `None` means the kind cannot be stored on its own.
    pub fn default_target(&self) -> Option<TargetType> {
        let name = match self {
            PrimitiveKind::Text => "TEXT",
            PrimitiveKind::Integer => "INTEGER",
            PrimitiveKind::BigInt => "BIGINT",
            PrimitiveKind::Decimal => "NUMERIC",
            PrimitiveKind::Boolean => "BOOLEAN",
            PrimitiveKind::Date => "DATE",
            PrimitiveKind::Timestamp => "TIMESTAMPTZ",
            PrimitiveKind::Time => "TIME",
            PrimitiveKind::Interval => "INTERVAL",
            PrimitiveKind::Uuid => "UUID",
            PrimitiveKind::Json => "JSONB",
            PrimitiveKind::Inet => "INET",
            PrimitiveKind::MacAddr => "MACADDR",
            PrimitiveKind::Range => return None,
        };
        Some(TargetType::new(name))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Integer | PrimitiveKind::BigInt | PrimitiveKind::Decimal
        )
    }

    /// Whether a value of kind `other` can be stored in a slot of this kind.
    pub fn accepts(&self, other: PrimitiveKind) -> bool {
        match (self, other) {
            (a, b) if *a == b => true,
            (PrimitiveKind::BigInt, PrimitiveKind::Integer) => true,
            (PrimitiveKind::Decimal, PrimitiveKind::Integer | PrimitiveKind::BigInt) => true,
            (PrimitiveKind::Timestamp, PrimitiveKind::Date) => true,
            _ => false,
        }
    }

    pub fn comparable_with(&self, other: PrimitiveKind) -> bool {
        self.accepts(other) || other.accepts(*self)
    }

    /// Scalar name used in query-layer metadata.
    pub fn query_scalar(&self) -> &'static str {
        match self {
            PrimitiveKind::Text => "String",
            PrimitiveKind::Integer | PrimitiveKind::BigInt => "Int",
            PrimitiveKind::Decimal => "Decimal",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Date => "Date",
            PrimitiveKind::Timestamp => "DateTime",
            PrimitiveKind::Time => "Time",
            PrimitiveKind::Interval => "Duration",
            PrimitiveKind::Uuid => "UUID",
            PrimitiveKind::Json | PrimitiveKind::Range => "JSON",
            PrimitiveKind::Inet => "IpAddress",
            PrimitiveKind::MacAddr => "MacAddress",
        }
    }

    /// Check that a JSON value has the right shape for this kind.
    pub fn check_shape(&self, value: &Value) -> Result<(), String> {
        let ok = match (self, value) {
            (PrimitiveKind::Json, _) => true,
            (PrimitiveKind::Text, Value::String(_)) => true,
            (PrimitiveKind::Integer, Value::Number(n)) => n
                .as_i64()
                .is_some_and(|v| i32::try_from(v).is_ok()),
            (PrimitiveKind::BigInt, Value::Number(n)) => n.as_i64().is_some(),
            (PrimitiveKind::Decimal, Value::Number(_)) => true,
            (PrimitiveKind::Decimal, Value::String(s)) => s.parse::<f64>().is_ok(),
            (PrimitiveKind::Boolean, Value::Bool(_)) => true,
            (PrimitiveKind::Date, Value::String(s)) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            (PrimitiveKind::Timestamp, Value::String(s)) => {
                DateTime::parse_from_rfc3339(s).is_ok()
                    || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            (PrimitiveKind::Time, Value::String(s)) => {
                NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
                    || NaiveTime::parse_from_str(s, "%H:%M").is_ok()
            }
            (PrimitiveKind::Interval, Value::String(s)) => !s.trim().is_empty(),
            (PrimitiveKind::Uuid, Value::String(s)) => is_uuid(s),
            (PrimitiveKind::Inet, Value::String(s)) => {
                let addr = s.split_once('/').map_or(s.as_str(), |(a, _)| a);
                addr.parse::<IpAddr>().is_ok()
            }
            (PrimitiveKind::MacAddr, Value::String(s)) => is_mac_address(s),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("expected {}, found {}", self.as_str(), describe(value)))
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

fn is_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_mac_address(s: &str) -> bool {
    let parts: Vec<&str> = s.split([':', '-']).collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Column type in the relational target, e.g. `NUMERIC(19,4)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<(u32, u32)>,
}

impl TargetType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            precision: None,
        }
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some((precision, scale));
        self
    }

    /// Parse `NAME` or `NAME(p,s)`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (name, precision) = match text.split_once('(') {
            None => (text, None),
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| format!("unbalanced parenthesis in '{}'", text))?;
                let (p, s) = match inner.split_once(',') {
                    Some((p, s)) => (p.trim(), s.trim()),
                    None => (inner.trim(), "0"),
                };
                let p: u32 = p
                    .parse()
                    .map_err(|_| format!("invalid precision '{}' in '{}'", p, text))?;
                let s: u32 = s
                    .parse()
                    .map_err(|_| format!("invalid scale '{}' in '{}'", s, text))?;
                (name.trim(), Some((p, s)))
            }
        };
        let target = Self {
            name: name.to_string(),
            precision,
        };
        target.check()?;
        Ok(target)
    }

    /// Structural sanity check applied at registration.
    pub fn check(&self) -> Result<(), String> {
        let mut chars = self.name.chars();
        let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ') {
            return Err(format!("'{}' is not a valid column type name", self.name));
        }
        if let Some((p, s)) = self.precision {
            if p == 0 || s > p {
                return Err(format!("precision ({},{}) is out of range", p, s));
            }
        }
        Ok(())
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            Some((p, s)) => write!(f, "{}({},{})", self.name, p, s),
            None => f.write_str(&self.name),
        }
    }
}
