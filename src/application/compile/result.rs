//! Compile Result
//!
//! What one run hands back: the ordered artifacts, their rendered text per
//! target, and every diagnostic collected on the way.

use std::fmt;

use crate::domain::entities::{Artifact, RenderedArtifact};
use crate::domain::value_objects::{ContentHash, Diagnostic, Severity, Target};
use crate::error::StrataError;

/// Output of a successful compile run
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Name of the compiled unit
    pub unit: String,
    /// Artifacts in emission order
    pub artifacts: Vec<Artifact>,
    /// Rendered text, grouped by target, each group in emission order
    pub rendered: Vec<RenderedArtifact>,
    /// Script header per target
    pub headers: Vec<(Target, String)>,
    pub diagnostics: Vec<Diagnostic>,
    /// Hash over every rendered artifact in order
    pub fingerprint: ContentHash,
}

impl CompileOutput {
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn rendered_for(&self, target: Target) -> impl Iterator<Item = &RenderedArtifact> {
        self.rendered.iter().filter(move |r| r.target == target)
    }

    /// The whole target output as one script.
    pub fn script(&self, target: Target) -> String {
        let mut script = self
            .headers
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, header)| header.clone())
            .unwrap_or_default();
        for rendered in self.rendered_for(target) {
            if !script.is_empty() {
                script.push('\n');
            }
            script.push_str(&rendered.text);
        }
        script
    }

    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.id().as_str() == id)
    }

    /// Position of an artifact in emission order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.artifacts.iter().position(|a| a.id().as_str() == id)
    }
}

/// A failed run: the error that stopped it plus the diagnostics recorded
/// before it stopped.
#[derive(Debug)]
pub struct CompileFailure {
    pub unit: String,
    pub error: StrataError,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileFailure {
    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error.location() {
            Some(location) => write!(f, "{}: {}", location, self.error),
            None => write!(f, "{}: {}", self.unit, self.error),
        }
    }
}

impl std::error::Error for CompileFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
