//! Configuration type definitions

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{ConfigWarning, ModelSettings, QualifiedName, Target};

use super::loader::{self, ConfigError};

/// Naming of generated database objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub table_prefix: String,
    pub view_prefix: String,
    /// `schema.name` of the composite type every action returns
    pub result_type: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        let settings = ModelSettings::default();
        Self {
            table_prefix: settings.table_prefix,
            view_prefix: settings.view_prefix,
            result_type: settings.result_type.to_string(),
        }
    }
}

/// Synthesized columns and routines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub audit_fields: bool,
    pub soft_delete: bool,
    pub identity_helpers: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            audit_fields: true,
            soft_delete: true,
            identity_helpers: true,
        }
    }
}

/// Target configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TargetsConfig {
    /// Enabled emitters; empty means every target
    pub enabled: Vec<Target>,
}

/// Defaults applied when a pattern instance leaves them out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub template_max_depth: usize,
    pub dependency_max_depth: usize,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        let settings = ModelSettings::default();
        Self {
            template_max_depth: settings.template_max_depth,
            dependency_max_depth: settings.dependency_max_depth,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CompileConfig {
    pub naming: NamingConfig,
    pub features: FeaturesConfig,
    pub targets: TargetsConfig,
    pub patterns: PatternsConfig,
}

impl CompileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let (config, _warnings) = loader::load_with_warnings(path)?;
        Ok(config)
    }

    /// Load configuration and collect non-fatal warnings (e.g. unknown keys).
    pub fn load_with_warnings(path: &Path) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        loader::load_with_warnings(path)
    }

    /// Apply environment variable overrides (STRATA_* prefix)
    pub fn with_env_overrides(self) -> Self {
        loader::with_env_overrides(self)
    }

    /// Get enabled targets (all if empty)
    pub fn enabled_targets(&self) -> Vec<Target> {
        if self.targets.enabled.is_empty() {
            Target::ALL.to_vec()
        } else {
            let mut targets = self.targets.enabled.clone();
            targets.sort();
            targets.dedup();
            targets
        }
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        for (key, prefix) in [
            ("naming.table_prefix", &self.naming.table_prefix),
            ("naming.view_prefix", &self.naming.view_prefix),
        ] {
            if !is_identifier_part(prefix) {
                return Err(invalid(key, format!("'{}' is not a valid name prefix", prefix)));
            }
        }
        let result_type = &self.naming.result_type;
        let valid_type = match result_type.split_once('.') {
            Some((schema, name)) => is_identifier(schema) && is_identifier(name),
            None => is_identifier(result_type),
        };
        if !valid_type {
            return Err(invalid(
                "naming.result_type",
                format!("'{}' is not a valid type name", result_type),
            ));
        }
        for (key, depth) in [
            ("patterns.template_max_depth", self.patterns.template_max_depth),
            ("patterns.dependency_max_depth", self.patterns.dependency_max_depth),
        ] {
            if depth == 0 {
                return Err(invalid(key, "must be at least 1".to_string()));
            }
        }
        Ok(())
    }

    /// Settings handed to the compile pipeline.
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            table_prefix: self.naming.table_prefix.clone(),
            view_prefix: self.naming.view_prefix.clone(),
            result_type: QualifiedName::parse(&self.naming.result_type, "app"),
            audit_fields: self.features.audit_fields,
            soft_delete: self.features.soft_delete,
            identity_helpers: self.features.identity_helpers,
            template_max_depth: self.patterns.template_max_depth,
            dependency_max_depth: self.patterns.dependency_max_depth,
        }
    }
}

fn is_identifier_part(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn is_identifier(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c == '_') && is_identifier_part(text)
}
