//! Type Registry
//!
//! Canonical catalogue of scalar and composite field types for one compile
//! run, with validation rules and the mapping to column types.
//!
//! ## Structure
//!
//! - `kind` - primitive kinds and target column types
//! - `predicate` - value rules carried by scalar types
//! - `definition` - declared and registered type forms
//! - `catalogue` - built-in types
//! - `registry` - `TypeRegistry`

mod catalogue;
mod definition;
mod kind;
mod predicate;
mod registry;

use std::fmt;

use thiserror::Error;

pub use catalogue::builtin_types;
pub use definition::{
    CompositeDef, CompositeType, RegisteredType, ScalarDef, ScalarType, SubFieldDef, TypeDef,
};
pub use kind::{PrimitiveKind, TargetType};
pub use predicate::ValuePredicate;
pub use registry::TypeRegistry;

/// One failing (sub-)value. `path` is dotted and empty for the root value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub path: String,
    pub message: String,
}

/// Every failure found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn push(&mut self, path: &str, message: impl Into<String>) {
        self.failures.push(ValidationFailure {
            path: path.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            if failure.path.is_empty() {
                f.write_str(&failure.message)?;
            } else {
                write!(f, "{}: {}", failure.path, failure.message)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("type '{name}' is already registered")]
    DuplicateType { name: String },

    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("type '{name}' has no target mapping: {reason}")]
    UnmappableType { name: String, reason: String },

    #[error("invalid definition for type '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("cyclic composite type: {}", path.join(" -> "))]
    CyclicComposite { path: Vec<String> },

    #[error("invalid value for type '{type_name}': {report}")]
    InvalidValue {
        type_name: String,
        report: ValidationReport,
    },
}

impl TypeError {
    pub fn code(&self) -> &'static str {
        match self {
            TypeError::DuplicateType { .. } => "duplicate-type",
            TypeError::UnknownType { .. } => "unknown-type",
            TypeError::UnmappableType { .. } => "unmappable-type",
            TypeError::InvalidDefinition { .. } => "invalid-type-definition",
            TypeError::CyclicComposite { .. } => "cyclic-composite",
            TypeError::InvalidValue { .. } => "invalid-value",
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, TypeError::CyclicComposite { .. })
    }
}
