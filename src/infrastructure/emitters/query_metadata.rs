//! Query Metadata Emitter
//!
//! Generates `COMMENT ON` annotations read by the query-layer generator:
//! - `@query:type <Entity>` on every table
//! - `@query:field <name> type=<Scalar>[!]` on every exposed column
//! - `@query:mutation <name> entity=<Entity>` on every action routine
//!
//! Constraints, indexes, views and generated routines have no annotation.

use crate::domain::actions::{Routine, RoutineKind};
use crate::domain::entities::{Artifact, ArtifactBody, Field, TableSpec};
use crate::domain::ports::{EmitError, TargetEmitter};
use crate::domain::types::PrimitiveKind;
use crate::domain::value_objects::{camel_case, snake_case, QualifiedName, Target};

use super::postgres::{quote, signature_types};

/// Query metadata emitter
pub struct QueryMetadataEmitter;

impl QueryMetadataEmitter {
    pub fn new() -> Self {
        Self
    }

    fn table(&self, name: &QualifiedName, spec: &TableSpec) -> String {
        let mut annotation = format!("@query:type {}", spec.entity);
        if let Some(description) = &spec.description {
            annotation.push('\n');
            annotation.push_str(description);
        }
        let mut sql = format!("COMMENT ON TABLE {} IS {};\n", name, quote(&annotation));
        for field in &spec.fields {
            if let Some(annotation) = field_annotation(field) {
                sql.push_str(&format!(
                    "COMMENT ON COLUMN {}.{} IS {};\n",
                    name,
                    field.name,
                    quote(&annotation)
                ));
            }
        }
        sql
    }

    fn mutation(&self, routine: &Routine) -> Option<String> {
        let action = routine.action.as_deref()?;
        if routine.kind != RoutineKind::Function {
            return None;
        }
        let name = camel_case(&format!("{}_{}", action, snake_case(&routine.entity)));
        Some(format!(
            "COMMENT ON FUNCTION {}({}) IS {};\n",
            routine.qualified_name(),
            signature_types(routine),
            quote(&format!("@query:mutation {} entity={}", name, routine.entity))
        ))
    }
}

impl Default for QueryMetadataEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetEmitter for QueryMetadataEmitter {
    fn target(&self) -> Target {
        Target::QueryMetadata
    }

    fn header(&self, unit: &str) -> String {
        format!("-- Query metadata for {}\n", unit)
    }

    fn render(&self, artifact: &Artifact) -> Result<Option<String>, EmitError> {
        Ok(match artifact.body() {
            ArtifactBody::Table(spec) => Some(self.table(artifact.name(), spec)),
            ArtifactBody::Routine(routine) => self.mutation(routine),
            _ => None,
        })
    }
}

fn field_annotation(field: &Field) -> Option<String> {
    if let Some(fk) = field.foreign_key() {
        let relation = field.name.strip_prefix("fk_").unwrap_or(&field.name);
        return Some(format!(
            "@query:field {} type={}",
            camel_case(relation),
            fk.entity
        ));
    }
    if !field.is_exposed() {
        return None;
    }
    let scalar = if field.kind == PrimitiveKind::Json && field.type_name != "json" {
        field.type_name.as_str()
    } else {
        field.kind.query_scalar()
    };
    let required = if field.nullable { "" } else { "!" };
    Some(format!(
        "@query:field {} type={}{}",
        camel_case(&field.name),
        scalar,
        required
    ))
}
