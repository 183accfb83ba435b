//! Configuration loading

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::value_objects::{ConfigWarning, Target};

use super::types::CompileConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config-io",
            ConfigError::Parse { .. } => "config-parse",
            ConfigError::InvalidValue { .. } => "config-value",
        }
    }
}

/// Load configuration and collect non-fatal warnings (e.g. unknown keys).
pub fn load_with_warnings(path: &Path) -> Result<(CompileConfig, Vec<ConfigWarning>), ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut unknown_paths: Vec<String> = Vec::new();
    let deserializer = toml::de::Deserializer::new(&content);

    let config: CompileConfig = serde_ignored::deserialize(deserializer, |p| {
        unknown_paths.push(p.to_string());
    })
    .map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;

    let warnings = unknown_paths
        .into_iter()
        .map(|path_str| {
            let key = path_str
                .split('.')
                .next_back()
                .unwrap_or(path_str.as_str())
                .to_string();
            ConfigWarning {
                key: key.clone(),
                file: path.to_path_buf(),
                line: find_line_number(&content, &key),
                suggestion: suggest_key(&key),
            }
        })
        .collect();

    tracing::debug!(path = %path.display(), "loaded config");
    Ok((config, warnings))
}

/// Apply environment variable overrides (STRATA_* prefix)
pub fn with_env_overrides(config: CompileConfig) -> CompileConfig {
    apply_overrides(config, |name| std::env::var(name).ok())
}

pub(super) fn apply_overrides(
    mut config: CompileConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CompileConfig {
    // STRATA_TARGETS (comma-separated)
    if let Some(targets) = lookup("STRATA_TARGETS") {
        let parsed: Vec<Target> = targets.split(',').filter_map(Target::from_key).collect();
        if !parsed.is_empty() {
            config.targets.enabled = parsed;
        }
    }

    // STRATA_AUDIT_FIELDS
    if let Some(val) = lookup("STRATA_AUDIT_FIELDS") {
        config.features.audit_fields = val.to_lowercase() != "false" && val != "0";
    }

    // STRATA_TABLE_PREFIX
    if let Some(prefix) = lookup("STRATA_TABLE_PREFIX") {
        config.naming.table_prefix = prefix;
    }

    config
}

fn find_line_number(content: &str, needle: &str) -> Option<usize> {
    for (i, line) in content.lines().enumerate() {
        if line.contains(needle) {
            return Some(i + 1);
        }
    }
    None
}

fn suggest_key(unknown: &str) -> Option<String> {
    const CANDIDATES: &[&str] = &[
        "naming",
        "table_prefix",
        "view_prefix",
        "result_type",
        "features",
        "audit_fields",
        "soft_delete",
        "identity_helpers",
        "targets",
        "enabled",
        "patterns",
        "template_max_depth",
        "dependency_max_depth",
    ];

    let mut best: Option<(&str, usize)> = None;
    for candidate in CANDIDATES {
        let dist = levenshtein(unknown, candidate);
        best = match best {
            None => Some((candidate, dist)),
            Some((_, best_dist)) if dist < best_dist => Some((candidate, dist)),
            Some(current) => Some(current),
        };
    }

    match best {
        Some((candidate, dist)) if dist <= 2 => Some(candidate.to_string()),
        _ => None,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut prev: Vec<usize> = (0..=b_bytes.len()).collect();
    let mut curr = vec![0usize; b_bytes.len() + 1];

    for (i, &ac) in a_bytes.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &bc) in b_bytes.iter().enumerate() {
            let cost = if ac == bc { 0 } else { 1 };
            curr[j + 1] =
                std::cmp::min(std::cmp::min(prev[j + 1] + 1, curr[j] + 1), prev[j] + cost);
        }
        prev.clone_from_slice(&curr);
    }

    prev[b_bytes.len()]
}
