//! Catalog the sandbox builds from ordered artifacts.

use std::collections::BTreeMap;

use super::SandboxError;
use crate::domain::actions::{Routine, RoutineBody, RoutineKind};
use crate::domain::entities::{
    Artifact, ArtifactBody, CheckRule, ConstraintRule, ExclusionElement, Field, FieldRole,
    RowPredicate, TableSpec, View,
};
use crate::domain::value_objects::QualifiedName;

#[derive(Debug, Default)]
pub(super) struct Schema {
    pub tables: BTreeMap<QualifiedName, TableDef>,
    pub views: BTreeMap<QualifiedName, ViewDef>,
    pub routines: BTreeMap<QualifiedName, Routine>,
    /// Entity name to table name
    pub entities: BTreeMap<String, QualifiedName>,
}

#[derive(Debug)]
pub(super) struct TableDef {
    pub name: QualifiedName,
    pub pk_column: String,
    pub fields: Vec<Field>,
    pub checks: Vec<(String, CheckRule)>,
    /// Primary key first, then unique columns, constraints and indexes.
    pub uniques: Vec<UniqueKey>,
    pub exclusions: Vec<Exclusion>,
    /// Row triggers, in firing order
    pub triggers: Vec<QualifiedName>,
    /// Views refreshed after each statement on the table
    pub refreshers: Vec<QualifiedName>,
}

#[derive(Debug)]
pub(super) struct UniqueKey {
    pub name: String,
    pub columns: Vec<String>,
    pub predicate: Option<RowPredicate>,
}

#[derive(Debug)]
pub(super) struct Exclusion {
    pub name: String,
    pub elements: Vec<ExclusionElement>,
    pub predicate: Option<RowPredicate>,
}

#[derive(Debug)]
pub(super) struct ViewDef {
    pub source: QualifiedName,
    pub view: View,
}

impl TableDef {
    fn new(name: QualifiedName, spec: &TableSpec) -> Self {
        let pk_column = spec
            .fields
            .iter()
            .find(|f| matches!(f.role, FieldRole::SurrogateKey))
            .map(|f| f.name.clone())
            .unwrap_or_default();
        let mut uniques = vec![UniqueKey {
            name: format!("{}_pkey", name.name),
            columns: vec![pk_column.clone()],
            predicate: None,
        }];
        uniques.extend(spec.fields.iter().filter(|f| f.unique).map(|f| UniqueKey {
            name: format!("{}_{}_key", name.name, f.name),
            columns: vec![f.name.clone()],
            predicate: None,
        }));
        Self {
            name,
            pk_column,
            fields: spec.fields.clone(),
            checks: Vec::new(),
            uniques,
            exclusions: Vec::new(),
            triggers: Vec::new(),
            refreshers: Vec::new(),
        }
    }

    pub fn field(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == column)
    }

    /// A row with every column null.
    pub fn empty_row(&self) -> super::Row {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), serde_json::Value::Null))
            .collect()
    }

    /// Postgres' default name for a column's foreign key.
    pub fn fkey_name(&self, column: &str) -> String {
        format!("{}_{}_fkey", self.name.name, column)
    }
}

impl Schema {
    pub fn build(artifacts: &[Artifact]) -> Self {
        let mut schema = Schema::default();
        for artifact in artifacts {
            match artifact.body() {
                ArtifactBody::ResultType => {}
                ArtifactBody::Table(spec) => {
                    let name = artifact.name().clone();
                    schema.entities.insert(spec.entity.clone(), name.clone());
                    schema.tables.insert(name.clone(), TableDef::new(name, spec));
                }
                ArtifactBody::Constraint { table, constraint } => {
                    let Some(def) = schema.tables.get_mut(table) else {
                        continue;
                    };
                    let name = constraint.name.clone();
                    match &constraint.rule {
                        ConstraintRule::Check(rule) => def.checks.push((name, rule.clone())),
                        ConstraintRule::Unique { columns } => def.uniques.push(UniqueKey {
                            name,
                            columns: columns.clone(),
                            predicate: None,
                        }),
                        ConstraintRule::Exclusion {
                            elements,
                            predicate,
                        } => def.exclusions.push(Exclusion {
                            name,
                            elements: elements.clone(),
                            predicate: predicate.clone(),
                        }),
                    }
                }
                ArtifactBody::Index { table, index } => {
                    if let (true, Some(def)) = (index.unique, schema.tables.get_mut(table)) {
                        def.uniques.push(UniqueKey {
                            name: index.name.clone(),
                            columns: index.columns.clone(),
                            predicate: index.predicate.clone(),
                        });
                    }
                }
                ArtifactBody::View { source, view } => {
                    schema.views.insert(
                        artifact.name().clone(),
                        ViewDef {
                            source: source.clone(),
                            view: view.clone(),
                        },
                    );
                }
                ArtifactBody::Routine(routine) => {
                    let name = routine.qualified_name();
                    if routine.kind == RoutineKind::Trigger {
                        if let Some(def) = schema.tables.get_mut(&routine.table.table) {
                            match &routine.body {
                                RoutineBody::RefreshView(view) => def.refreshers.push(view.clone()),
                                _ => def.triggers.push(name.clone()),
                            }
                        }
                    }
                    schema.routines.insert(name, routine.clone());
                }
            }
        }
        // Postgres fires triggers of one timing in name order; every
        // trigger is named `trg_<routine>`.
        for def in schema.tables.values_mut() {
            def.triggers.sort_by(|a, b| a.name.cmp(&b.name));
        }
        schema
    }

    pub fn table(&self, name: &QualifiedName) -> Result<&TableDef, SandboxError> {
        self.tables
            .get(name)
            .ok_or_else(|| SandboxError::UnknownEntity(name.to_string()))
    }

    pub fn table_of(&self, entity: &str) -> Result<&TableDef, SandboxError> {
        self.entities
            .get(entity)
            .and_then(|name| self.tables.get(name))
            .ok_or_else(|| SandboxError::UnknownEntity(entity.to_string()))
    }

    pub fn routine_of(&self, entity: &str, name: &str) -> Result<&Routine, SandboxError> {
        self.routines
            .values()
            .find(|r| r.entity == entity && r.name == name)
            .ok_or_else(|| SandboxError::UnknownRoutine(format!("{}.{}", entity, name)))
    }

    /// Columns elsewhere that reference `table`, as (table, column).
    pub fn referencing(&self, table: &QualifiedName) -> Vec<(&TableDef, &Field)> {
        self.tables
            .values()
            .flat_map(|def| def.fields.iter().map(move |f| (def, f)))
            .filter(|(_, f)| f.foreign_key().is_some_and(|fk| fk.table == *table))
            .collect()
    }
}
