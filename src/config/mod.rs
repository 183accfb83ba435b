//! Configuration module for strata
//!
//! Configuration hierarchy:
//! 1. Environment variables (STRATA_*) (highest priority)
//! 2. Config file (`strata.toml`)
//! 3. Built-in defaults (lowest priority)
//!
//! Configuration is read by the caller before a run; the compile pipeline
//! only ever sees the resulting [`ModelSettings`](crate::domain::value_objects::ModelSettings).

mod loader;
mod types;

// Re-export ConfigWarning from domain layer
pub use crate::domain::value_objects::ConfigWarning;

pub use loader::{load_with_warnings, with_env_overrides, ConfigError};
pub use types::{CompileConfig, FeaturesConfig, NamingConfig, PatternsConfig, TargetsConfig};
