//! Domain Value Objects
//!
//! Immutable value types shared by every stage of a compile run.

mod artifact_id;
mod config_warning;
mod diagnostic;
mod hash;
mod names;
mod settings;
mod target;

pub use artifact_id::{ArtifactId, ArtifactKind};
pub use config_warning::ConfigWarning;
pub use diagnostic::{Diagnostic, Severity, SourceLocation};
pub use hash::ContentHash;
pub use names::{camel_case, snake_case, QualifiedName};
pub use settings::ModelSettings;
pub use target::Target;
