//! Target value object - which renderer an artifact is emitted for

use serde::{Deserialize, Serialize};

/// Output target for emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// PostgreSQL DDL and PL/pgSQL routines
    #[serde(alias = "postgresql")]
    Postgres,
    /// Annotations consumed by the query layer generator
    QueryMetadata,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Postgres, Target::QueryMetadata];

    pub fn display_name(&self) -> &'static str {
        match self {
            Target::Postgres => "PostgreSQL",
            Target::QueryMetadata => "Query metadata",
        }
    }

    /// Stable identifier used in config files and environment variables.
    pub fn key(&self) -> &'static str {
        match self {
            Target::Postgres => "postgres",
            Target::QueryMetadata => "query-metadata",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Target::Postgres),
            "query-metadata" | "query_metadata" | "metadata" => Some(Target::QueryMetadata),
            _ => None,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_serde_kebab_case() {
        let json = serde_json::to_string(&Target::QueryMetadata).unwrap();
        assert_eq!(json, "\"query-metadata\"");

        let parsed: Target = serde_json::from_str("\"postgresql\"").unwrap();
        assert_eq!(parsed, Target::Postgres);
    }

    #[test]
    fn target_from_key() {
        assert_eq!(Target::from_key(" Postgres "), Some(Target::Postgres));
        assert_eq!(Target::from_key("metadata"), Some(Target::QueryMetadata));
        assert_eq!(Target::from_key("mysql"), None);
    }
}
