//! Pattern Resolver
//!
//! Patterns are a closed catalogue. Each one is a pure function from an
//! entity snapshot and its configuration to a [`Fragment`] of new members;
//! the resolver merges the fragment into the entity only when every member
//! fits, so a rejected instance leaves the entity untouched.
//!
//! ## Structure
//!
//! - `config` - typed configuration reader
//! - one module per pattern, each with `expand` plus the pure runtime
//!   semantics the generated routines implement

pub mod aggregate_view;
mod config;
pub mod non_overlapping_range;
pub mod recursive_dependency;
pub mod scd_type2;
pub mod state_machine;
pub mod template_inheritance;

use thiserror::Error;

pub use config::ConfigReader;

use crate::domain::actions::Routine;
use crate::domain::entities::{
    Action, Cardinality, Constraint, Entity, Field, FieldRole, ForeignKeyRef, Guard, Index, Origin,
    PatternDecl, Relation, View,
};
use crate::domain::services::EntityModel;
use crate::domain::types::{PrimitiveKind, TargetType, TypeRegistry};
use crate::domain::value_objects::{Diagnostic, ModelSettings, SourceLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternKind {
    StateMachine,
    NonOverlappingRange,
    TemplateInheritance,
    RecursiveDependency,
    ScdType2,
    AggregateView,
}

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::StateMachine,
        PatternKind::NonOverlappingRange,
        PatternKind::TemplateInheritance,
        PatternKind::RecursiveDependency,
        PatternKind::ScdType2,
        PatternKind::AggregateView,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::StateMachine => "state_machine",
            PatternKind::NonOverlappingRange => "non_overlapping_range",
            PatternKind::TemplateInheritance => "template_inheritance",
            PatternKind::RecursiveDependency => "recursive_dependency",
            PatternKind::ScdType2 => "scd_type2",
            PatternKind::AggregateView => "aggregate_view",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Expand one instance. Pure: same entity and config, same fragment.
    pub fn expand(
        &self,
        entity: &Entity,
        config: &mut ConfigReader<'_>,
        ctx: &PatternContext<'_>,
    ) -> Result<Fragment, PatternError> {
        match self {
            PatternKind::StateMachine => state_machine::expand(entity, config, ctx),
            PatternKind::NonOverlappingRange => non_overlapping_range::expand(entity, config, ctx),
            PatternKind::TemplateInheritance => template_inheritance::expand(entity, config, ctx),
            PatternKind::RecursiveDependency => recursive_dependency::expand(entity, config, ctx),
            PatternKind::ScdType2 => scd_type2::expand(entity, config, ctx),
            PatternKind::AggregateView => aggregate_view::expand(entity, config, ctx),
        }
    }
}

/// Read-only context shared by every expansion in a run.
#[derive(Debug, Clone, Copy)]
pub struct PatternContext<'a> {
    pub registry: &'a TypeRegistry,
    pub settings: &'a ModelSettings,
    /// The model as it stood before this instance, for patterns that read
    /// other entities.
    pub model: Option<&'a EntityModel>,
}

/// Members one pattern instance adds to an entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub fields: Vec<Field>,
    pub relations: Vec<Relation>,
    pub guards: Vec<Guard>,
    pub constraints: Vec<Constraint>,
    pub indexes: Vec<Index>,
    pub views: Vec<View>,
    pub actions: Vec<Action>,
    pub routines: Vec<Routine>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.relations.is_empty()
            && self.guards.is_empty()
            && self.constraints.is_empty()
            && self.indexes.is_empty()
            && self.views.is_empty()
            && self.actions.is_empty()
            && self.routines.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternErrorKind {
    #[error("unknown pattern (available: {available})")]
    UnknownPattern { available: String },

    #[error("missing required key '{key}'")]
    MissingKey { key: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("'{name}' is already defined by {existing}")]
    NameConflict { name: String, existing: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entity '{entity}', pattern '{pattern}': {kind}")]
pub struct PatternError {
    pub entity: String,
    pub pattern: String,
    pub location: Option<SourceLocation>,
    pub kind: PatternErrorKind,
}

impl PatternError {
    pub fn code(&self) -> &'static str {
        match self.kind {
            PatternErrorKind::UnknownPattern { .. } => "unknown-pattern",
            PatternErrorKind::MissingKey { .. } | PatternErrorKind::InvalidValue { .. } => {
                "invalid-config"
            }
            PatternErrorKind::NameConflict { .. } => "name-conflict",
        }
    }
}

/// Applies pattern instances to the entities of a model.
pub struct PatternResolver<'a> {
    ctx: PatternContext<'a>,
}

impl<'a> PatternResolver<'a> {
    pub fn new(registry: &'a TypeRegistry, settings: &'a ModelSettings) -> Self {
        Self {
            ctx: PatternContext {
                registry,
                settings,
                model: None,
            },
        }
    }

    /// Expand `decl` against `entity` and merge the result in place.
    ///
    /// Returns the diagnostics of the expansion, including one warning per
    /// configuration key the pattern did not read.
    pub fn apply(
        &self,
        model: &mut EntityModel,
        entity: &str,
        decl: &PatternDecl,
    ) -> Result<Vec<Diagnostic>, PatternError> {
        let mut reader = ConfigReader::new(entity, &decl.name, decl.location.as_ref(), &decl.config);
        let Some(kind) = PatternKind::from_name(&decl.name) else {
            return Err(reader.error(PatternErrorKind::UnknownPattern {
                available: PatternKind::ALL.map(|k| k.name()).join(", "),
            }));
        };
        let snapshot = model.entity(entity).ok_or_else(|| {
            reader.invalid("entity", format!("entity '{}' is not declared", entity))
        })?;

        let ctx = PatternContext {
            model: Some(&*model),
            ..self.ctx
        };
        let mut fragment = kind.expand(snapshot, &mut reader, &ctx)?;
        for key in reader.unused() {
            fragment.diagnostics.push(
                Diagnostic::warning(
                    "unknown-config-key",
                    format!("pattern '{}' on '{}' ignores key '{}'", decl.name, entity, key),
                )
                .at(decl.location.clone()),
            );
        }

        let plan = plan_merge(snapshot, kind.name(), &fragment)
            .map_err(|kind| reader.error(kind))?;
        let target = model.entity_mut(entity).ok_or_else(|| {
            reader.invalid("entity", format!("entity '{}' is not declared", entity))
        })?;
        let diagnostics = std::mem::take(&mut fragment.diagnostics);
        merge(target, fragment, &plan);
        tracing::debug!(entity, pattern = kind.name(), "applied pattern");
        Ok(diagnostics)
    }
}

/// Which fragment members are already present from an earlier identical
/// expansion and must be skipped.
#[derive(Debug, Default)]
struct MergePlan {
    skip: Vec<String>,
}

fn conflict(name: &str, existing: &Origin) -> PatternErrorKind {
    PatternErrorKind::NameConflict {
        name: name.to_string(),
        existing: existing.to_string(),
    }
}

fn plan_merge(entity: &Entity, pattern: &str, fragment: &Fragment) -> Result<MergePlan, PatternErrorKind> {
    let origin = Origin::Pattern(pattern.to_string());
    let mut plan = MergePlan::default();

    // `same` is true when the existing member equals the new one.
    let mut check = |name: &str, existing: Option<&Origin>, same: bool| match existing {
        None => Ok(()),
        Some(o) if *o == origin && same => {
            plan.skip.push(name.to_string());
            Ok(())
        }
        Some(o) => Err(conflict(name, o)),
    };

    for f in &fragment.fields {
        check(&f.name, entity.column_owner(&f.name), entity.field(&f.name) == Some(f))?;
    }
    for r in &fragment.relations {
        check(&r.name, entity.column_owner(&r.name), entity.relation(&r.name) == Some(r))?;
    }
    for c in &fragment.constraints {
        let same = entity.constraints().iter().any(|e| e == c);
        check(&c.name, entity.relation_owner(&c.name), same)?;
    }
    for i in &fragment.indexes {
        let same = entity.indexes().iter().any(|e| e == i);
        check(&i.name, entity.relation_owner(&i.name), same)?;
    }
    for v in &fragment.views {
        let same = entity.views().iter().any(|e| e == v);
        check(&v.name, entity.relation_owner(&v.name), same)?;
    }
    for a in &fragment.actions {
        check(&a.name, entity.routine_owner(&a.name), entity.action(&a.name) == Some(a))?;
    }
    for r in &fragment.routines {
        check(&r.name, entity.routine_owner(&r.name), entity.routine(&r.name) == Some(r))?;
    }
    for g in &fragment.guards {
        if let Some(existing) = entity.guard(&g.name) {
            if existing != g {
                return Err(conflict(&g.name, &Origin::Declared));
            }
            plan.skip.push(g.name.clone());
        }
    }
    Ok(plan)
}

fn merge(entity: &mut Entity, fragment: Fragment, plan: &MergePlan) {
    let keep = |name: &str| !plan.skip.iter().any(|s| s == name);
    fragment.fields.into_iter().filter(|f| keep(&f.name)).for_each(|f| entity.push_field(f));
    fragment
        .relations
        .into_iter()
        .filter(|r| keep(&r.name))
        .for_each(|r| entity.push_relation(r));
    fragment.guards.into_iter().filter(|g| keep(&g.name)).for_each(|g| entity.push_guard(g));
    fragment
        .constraints
        .into_iter()
        .filter(|c| keep(&c.name))
        .for_each(|c| entity.push_constraint(c));
    fragment.indexes.into_iter().filter(|i| keep(&i.name)).for_each(|i| entity.push_index(i));
    fragment.views.into_iter().filter(|v| keep(&v.name)).for_each(|v| entity.push_view(v));
    fragment.actions.into_iter().filter(|a| keep(&a.name)).for_each(|a| entity.push_action(a));
    fragment
        .routines
        .into_iter()
        .filter(|r| keep(&r.name))
        .for_each(|r| entity.push_routine(r));
}

/// Self-referencing `one` relation used by the chain patterns.
///
/// Reuses the relation when the entity already has it; otherwise the
/// returned fragment adds it together with its foreign key and index.
pub(crate) fn self_link(
    entity: &Entity,
    relation: &str,
    pattern: &str,
    config: &ConfigReader<'_>,
    key: &str,
) -> Result<(String, Fragment), PatternError> {
    if let Some(existing) = entity.relation(relation) {
        if existing.cardinality != Cardinality::One || existing.target != entity.name() {
            return Err(config.invalid(
                key,
                format!("'{}' must be a one relation to {} itself", relation, entity.name()),
            ));
        }
        return Ok((existing.column.clone(), Fragment::default()));
    }
    let column = format!("fk_{}", relation);
    if entity.field(&column).is_some() {
        return Err(config.invalid(key, format!("'{}' is already a column", column)));
    }

    let origin = Origin::Pattern(pattern.to_string());
    let field = Field::new(&column, "integer", PrimitiveKind::Integer, TargetType::new("INTEGER"))
        .with_role(FieldRole::ForeignKey(ForeignKeyRef {
            entity: entity.name().to_string(),
            table: entity.table(),
            column: entity.pk_column(),
        }))
        .with_origin(origin.clone());
    let index = Index::btree(
        format!("idx_{}_{}", entity.table_name(), column),
        vec![column.clone()],
        origin.clone(),
    );
    let fragment = Fragment {
        fields: vec![field],
        relations: vec![Relation {
            name: relation.to_string(),
            target: entity.name().to_string(),
            cardinality: Cardinality::One,
            nullable: true,
            column: column.clone(),
            origin,
        }],
        indexes: vec![index],
        ..Fragment::default()
    };
    Ok((column, fragment))
}

/// SQL text literal for generated step expressions.
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
