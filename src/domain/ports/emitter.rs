//! Target Emitter Port
//!
//! Renders one ordered artifact into the text of one target. Rendering is
//! pure: everything an emitter needs was validated upstream, so a failure
//! here is a bug in an earlier stage.

use thiserror::Error;

use crate::domain::entities::Artifact;
use crate::domain::value_objects::{ArtifactId, Target};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The artifact is well-formed but this emitter has no rendering for it
    #[error("{target} cannot render '{id}': {reason}")]
    Unrenderable {
        target: Target,
        id: ArtifactId,
        reason: String,
    },
}

impl EmitError {
    pub fn code(&self) -> &'static str {
        match self {
            EmitError::Unrenderable { .. } => "unrenderable-artifact",
        }
    }
}

/// Renderer for one target.
pub trait TargetEmitter: Send + Sync {
    fn target(&self) -> Target;

    /// Text for `artifact`, or `None` when the target has nothing to say
    /// about this kind of artifact.
    fn render(&self, artifact: &Artifact) -> Result<Option<String>, EmitError>;

    /// Text placed before the first artifact of a script.
    fn header(&self, unit: &str) -> String {
        let _ = unit;
        String::new()
    }
}
