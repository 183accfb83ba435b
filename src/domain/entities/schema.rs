//! Constraints, indexes and views owned by an entity.

use serde::{Deserialize, Serialize};

use super::Origin;

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub rule: ConstraintRule,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintRule {
    Check(CheckRule),
    Unique {
        columns: Vec<String>,
    },
    /// `EXCLUDE USING gist (...)`.
    Exclusion {
        elements: Vec<ExclusionElement>,
        predicate: Option<RowPredicate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionElement {
    pub column: String,
    pub operator: String,
}

impl ExclusionElement {
    pub fn new(column: impl Into<String>, operator: &str) -> Self {
        Self {
            column: column.into(),
            operator: operator.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckRule {
    Matches {
        column: String,
        pattern: String,
    },
    /// Inclusive bounds.
    Between {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    OneOf {
        column: String,
        values: Vec<String>,
    },
    NotNull {
        column: String,
    },
    /// `start < end` (or `<=`), holding vacuously while `end` is null.
    Ordered {
        start: String,
        end: String,
        allow_equal: bool,
    },
}

/// Row filter used by partial indexes, exclusion constraints and views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPredicate {
    IsNull(String),
    IsTrue(String),
    All(Vec<RowPredicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    BTree,
    Gist,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub method: IndexMethod,
    pub unique: bool,
    pub predicate: Option<RowPredicate>,
    pub origin: Origin,
}

impl Index {
    pub fn btree(name: impl Into<String>, columns: Vec<String>, origin: Origin) -> Self {
        Self {
            name: name.into(),
            columns,
            method: IndexMethod::BTree,
            unique: false,
            predicate: None,
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// `None` only for `count(*)`.
    pub column: Option<String>,
    pub alias: String,
}

/// Materialized aggregate over the owning entity's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub group_by: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub predicate: Option<RowPredicate>,
    pub origin: Origin,
}
