//! Artifact identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::QualifiedName;

/// Kind of generated output unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Shared composite result type
    Type,
    Table,
    Constraint,
    Index,
    View,
    Routine,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Type => "type",
            ArtifactKind::Table => "table",
            ArtifactKind::Constraint => "constraint",
            ArtifactKind::Index => "index",
            ArtifactKind::View => "view",
            ArtifactKind::Routine => "routine",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact identifier of the form `kind:schema.name`.
///
/// Ordering is plain lexical order of the identifier text; the orderer
/// relies on this for its tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(kind: ArtifactKind, name: &QualifiedName) -> Self {
        Self(format!("{}:{}", kind.as_str(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_id_format() {
        let id = ArtifactId::new(ArtifactKind::Table, &QualifiedName::new("crm", "tb_lead"));
        assert_eq!(id.as_str(), "table:crm.tb_lead");
    }

    #[test]
    fn artifact_ids_order_lexically() {
        let a = ArtifactId::new(ArtifactKind::Index, &QualifiedName::new("crm", "b"));
        let b = ArtifactId::new(ArtifactKind::Constraint, &QualifiedName::new("crm", "z"));
        assert!(b < a);
    }
}
