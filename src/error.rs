//! Error types for Strata
//!
//! Every component owns a `thiserror` enum; `StrataError` wraps them so a
//! caller can handle one type and still tell user mistakes from bugs.

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::actions::CompileError;
use crate::domain::patterns::PatternError;
use crate::domain::ports::EmitError;
use crate::domain::services::{ModelError, OrderError};
use crate::domain::types::TypeError;
use crate::domain::value_objects::SourceLocation;

/// Result type alias for Strata operations
pub type StrataResult<T> = Result<T, StrataError>;

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Unknown type, dangling reference, duplicate name
    Specification,
    /// Missing or mistyped pattern key, name conflict
    PatternConfig,
    /// Cycles in composite types, templates, dependencies or artifacts
    Structural,
    /// An earlier stage handed over something it should have rejected
    Internal,
    /// Configuration could not be read
    Environment,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Specification => "specification",
            ErrorClass::PatternConfig => "pattern-config",
            ErrorClass::Structural => "structural",
            ErrorClass::Internal => "internal",
            ErrorClass::Environment => "environment",
        }
    }

    /// Whether editing the input can fix it.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ErrorClass::Internal)
    }
}

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("action error: {0}")]
    Compile(#[from] CompileError),

    #[error("ordering error: {0}")]
    Order(#[from] OrderError),

    #[error("internal error: {0}")]
    Emit(#[from] EmitError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl StrataError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StrataError::Type(e) if e.is_structural() => ErrorClass::Structural,
            StrataError::Type(_) | StrataError::Model(_) | StrataError::Compile(_) => {
                ErrorClass::Specification
            }
            StrataError::Pattern(_) => ErrorClass::PatternConfig,
            StrataError::Order(OrderError::Cycle { .. }) => ErrorClass::Structural,
            StrataError::Order(OrderError::DuplicateArtifact { .. }) => ErrorClass::Specification,
            StrataError::Order(_) | StrataError::Emit(_) => ErrorClass::Internal,
            StrataError::Config(_) => ErrorClass::Environment,
        }
    }

    /// Stable kebab-case code.
    pub fn code(&self) -> &'static str {
        match self {
            StrataError::Type(e) => e.code(),
            StrataError::Model(e) => e.code(),
            StrataError::Pattern(e) => e.code(),
            StrataError::Compile(e) => e.code(),
            StrataError::Order(e) => e.code(),
            StrataError::Emit(e) => e.code(),
            StrataError::Config(e) => e.code(),
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            StrataError::Model(e) => e.location(),
            StrataError::Pattern(e) => e.location.as_ref(),
            StrataError::Compile(e) => e.location.as_ref(),
            _ => None,
        }
    }
}
