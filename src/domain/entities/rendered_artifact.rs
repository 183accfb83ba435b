//! RenderedArtifact - an artifact's text for one target.

use serde::Serialize;

use crate::domain::value_objects::{ArtifactId, ArtifactKind, ContentHash, Target};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedArtifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub target: Target,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub depends_on: Vec<ArtifactId>,
    pub text: String,
    pub hash: ContentHash,
}

impl RenderedArtifact {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
