//! Artifact - one orderable, renderable unit of generated output.

use std::collections::BTreeSet;

use super::{Constraint, Field, Index, View};
use crate::domain::actions::Routine;
use crate::domain::value_objects::{ArtifactId, ArtifactKind, QualifiedName};

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    id: ArtifactId,
    name: QualifiedName,
    entity: Option<String>,
    action: Option<String>,
    depends_on: BTreeSet<ArtifactId>,
    body: ArtifactBody,
}

/// Structured content an emitter renders.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactBody {
    /// Shared result type returned by action routines.
    ResultType,
    Table(TableSpec),
    Constraint {
        table: QualifiedName,
        constraint: Constraint,
    },
    Index {
        table: QualifiedName,
        index: Index,
    },
    View {
        source: QualifiedName,
        view: View,
    },
    Routine(Routine),
}

impl ArtifactBody {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactBody::ResultType => ArtifactKind::Type,
            ArtifactBody::Table(_) => ArtifactKind::Table,
            ArtifactBody::Constraint { .. } => ArtifactKind::Constraint,
            ArtifactBody::Index { .. } => ArtifactKind::Index,
            ArtifactBody::View { .. } => ArtifactKind::View,
            ArtifactBody::Routine(_) => ArtifactKind::Routine,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub entity: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,
}

impl TableSpec {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Artifact {
    pub fn new(name: QualifiedName, body: ArtifactBody) -> Self {
        Self {
            id: ArtifactId::new(body.kind(), &name),
            name,
            entity: None,
            action: None,
            depends_on: BTreeSet::new(),
            body,
        }
    }

    pub fn for_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn for_action(mut self, action: Option<String>) -> Self {
        self.action = action;
        self
    }

    pub fn depends_on(mut self, id: ArtifactId) -> Self {
        if id != self.id {
            self.depends_on.insert(id);
        }
        self
    }

    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    pub fn kind(&self) -> ArtifactKind {
        self.body.kind()
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn dependencies(&self) -> &BTreeSet<ArtifactId> {
        &self.depends_on
    }

    pub fn body(&self) -> &ArtifactBody {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_dependency_is_ignored() {
        let name = QualifiedName::new("app", "mutation_result");
        let own = ArtifactId::new(ArtifactKind::Type, &name);
        let artifact = Artifact::new(name, ArtifactBody::ResultType).depends_on(own);
        assert!(artifact.dependencies().is_empty());
        assert_eq!(artifact.id().as_str(), "type:app.mutation_result");
    }
}
