//! Entity Model
//!
//! Entities are built in two passes. `declare` turns each declaration into
//! an [`Entity`] with its identity trio, audit columns and declared fields;
//! `wire` then resolves relations, so a relation may name an entity that is
//! declared later or in another unit.

use std::collections::BTreeMap;

use thiserror::Error;

use super::stdlib;
use crate::domain::entities::{
    Action, Cardinality, CheckRule, ColumnDefault, Constraint, ConstraintRule, Entity, EntityDecl,
    Field, FieldDecl, FieldRole, ForeignKeyRef, IdentifierRule, Index, Origin, Relation,
    RelationDecl, SpecBundle, StdlibImport, CREATED_AT, DELETED_AT, EXTERNAL_ID, IDENTIFIER, UPDATED_AT,
};
use crate::domain::types::{PrimitiveKind, TargetType, TypeError, TypeRegistry, ValuePredicate};
use crate::domain::value_objects::{ModelSettings, SourceLocation};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("entity '{entity}' is declared more than once")]
    DuplicateEntity {
        entity: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': '{name}' is declared more than once")]
    DuplicateField {
        entity: String,
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': field '{field}' has unknown type '{type_name}'")]
    UnknownFieldType {
        entity: String,
        field: String,
        type_name: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': '{name}' is a synthesized attribute and cannot be declared")]
    IdentityOverride {
        entity: String,
        name: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': relation '{relation}' targets undeclared entity '{target}'")]
    DanglingReference {
        entity: String,
        relation: String,
        target: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': relation '{relation}' has no inverse on '{target}': {reason}")]
    UnresolvedInverse {
        entity: String,
        relation: String,
        target: String,
        reason: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': invalid default for '{field}': {reason}")]
    InvalidDefault {
        entity: String,
        field: String,
        reason: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': enum field '{field}' needs a non-empty value list")]
    InvalidEnum {
        entity: String,
        field: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': duplicate guard '{guard}'")]
    DuplicateGuard {
        entity: String,
        guard: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': duplicate action '{action}'")]
    DuplicateAction {
        entity: String,
        action: String,
        location: Option<SourceLocation>,
    },

    #[error("unknown stdlib entity '{entity}' (available: {available})")]
    UnknownStdlibEntity {
        entity: String,
        available: String,
        location: Option<SourceLocation>,
    },

    #[error("stdlib entity '{entity}': cannot exclude '{name}': {reason}")]
    InvalidExclusion {
        entity: String,
        name: String,
        reason: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}': identifier component '{component}' is not a declared field")]
    InvalidIdentifier {
        entity: String,
        component: String,
        location: Option<SourceLocation>,
    },

    #[error("entity '{entity}' is not declared")]
    UnknownEntity { entity: String },
}

impl ModelError {
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::DuplicateEntity { .. } => "duplicate-entity",
            ModelError::DuplicateField { .. } => "duplicate-field",
            ModelError::UnknownFieldType { .. } => "unknown-type",
            ModelError::IdentityOverride { .. } => "identity-override",
            ModelError::DanglingReference { .. } => "dangling-reference",
            ModelError::UnresolvedInverse { .. } => "unresolved-inverse",
            ModelError::InvalidDefault { .. } => "invalid-default",
            ModelError::InvalidEnum { .. } => "invalid-enum",
            ModelError::DuplicateGuard { .. } => "duplicate-guard",
            ModelError::DuplicateAction { .. } => "duplicate-action",
            ModelError::UnknownStdlibEntity { .. } => "unknown-stdlib-entity",
            ModelError::InvalidExclusion { .. } => "invalid-exclusion",
            ModelError::InvalidIdentifier { .. } => "invalid-identifier",
            ModelError::UnknownEntity { .. } => "unknown-entity",
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            ModelError::DuplicateEntity { location, .. }
            | ModelError::DuplicateField { location, .. }
            | ModelError::UnknownFieldType { location, .. }
            | ModelError::IdentityOverride { location, .. }
            | ModelError::DanglingReference { location, .. }
            | ModelError::UnresolvedInverse { location, .. }
            | ModelError::InvalidDefault { location, .. }
            | ModelError::InvalidEnum { location, .. }
            | ModelError::DuplicateGuard { location, .. }
            | ModelError::DuplicateAction { location, .. }
            | ModelError::UnknownStdlibEntity { location, .. }
            | ModelError::InvalidExclusion { location, .. }
            | ModelError::InvalidIdentifier { location, .. } => location.as_ref(),
            ModelError::UnknownEntity { .. } => None,
        }
    }
}

/// Relation waiting for the wire pass.
#[derive(Debug, Clone)]
struct PendingRelation {
    entity: String,
    decl: RelationDecl,
    location: Option<SourceLocation>,
}

/// All entities of one compile run.
#[derive(Debug, Clone)]
pub struct EntityModel {
    entities: BTreeMap<String, Entity>,
    declared: Vec<String>,
    pending: Vec<PendingRelation>,
    settings: ModelSettings,
}

impl EntityModel {
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            entities: BTreeMap::new(),
            declared: Vec::new(),
            pending: Vec::new(),
            settings,
        }
    }

    /// Imports, declarations and wiring of one bundle.
    pub fn from_bundle(
        bundle: &SpecBundle,
        registry: &TypeRegistry,
        settings: ModelSettings,
    ) -> Result<Self, ModelError> {
        let mut model = Self::new(settings);
        for import in &bundle.imports {
            model.import(import, registry)?;
        }
        for decl in &bundle.entities {
            model.declare(decl, registry)?;
        }
        model.wire()?;
        Ok(model)
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub(crate) fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.get_mut(name)
    }

    /// Entities in lexical name order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entity names in declaration order.
    pub fn declaration_order(&self) -> &[String] {
        &self.declared
    }

    /// Names the synthesized columns of every entity use.
    pub fn reserved_names(&self, entity: &str) -> Vec<String> {
        let mut names = vec![
            format!("pk_{}", crate::domain::value_objects::snake_case(entity)),
            EXTERNAL_ID.to_string(),
            IDENTIFIER.to_string(),
        ];
        if self.settings.audit_fields {
            names.extend([CREATED_AT, UPDATED_AT, DELETED_AT].map(String::from));
        }
        names
    }

    /// Build one entity from its declaration. Relations are queued for `wire`.
    pub fn declare(&mut self, decl: &EntityDecl, registry: &TypeRegistry) -> Result<(), ModelError> {
        let location = decl.location.clone();
        if self.entities.contains_key(&decl.name) {
            return Err(ModelError::DuplicateEntity {
                entity: decl.name.clone(),
                location,
            });
        }

        let mut entity = Entity::new(&decl.name, &decl.schema, &self.settings.table_prefix)
            .with_description(decl.description.clone())
            .with_location(location.clone());
        let rule = identifier_rule(&entity, decl)?;
        for field in synthesized_fields(&entity, rule, &self.settings) {
            entity.push_field(field);
        }

        let reserved = self.reserved_names(&decl.name);
        let mut pending = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for field in &decl.fields {
            let at = field.location.clone().or_else(|| location.clone());
            check_name(&decl.name, &field.name, &reserved, &seen, at.clone())?;
            seen.push(&field.name);

            if let Some(target) = field.reference_target() {
                let mut relation = RelationDecl::one(&field.name, target);
                relation.nullable = field.nullable;
                pending.push(PendingRelation {
                    entity: decl.name.clone(),
                    decl: relation,
                    location: at,
                });
                continue;
            }

            let (built, checks) = declared_field(&entity, field, registry, at)?;
            entity.push_field(built);
            for check in checks {
                entity.push_constraint(check);
            }
        }

        for relation in &decl.relations {
            let at = relation.location.clone().or_else(|| location.clone());
            check_name(&decl.name, &relation.name, &reserved, &seen, at.clone())?;
            seen.push(&relation.name);
            pending.push(PendingRelation {
                entity: decl.name.clone(),
                decl: relation.clone(),
                location: at,
            });
        }

        for guard in &decl.guards {
            if entity.guard(&guard.name).is_some() {
                return Err(ModelError::DuplicateGuard {
                    entity: decl.name.clone(),
                    guard: guard.name.clone(),
                    location,
                });
            }
            entity.push_guard(guard.clone());
        }

        for pattern in &decl.patterns {
            entity.push_pattern(pattern.clone());
        }

        for action in &decl.actions {
            if entity.action(&action.name).is_some() {
                return Err(ModelError::DuplicateAction {
                    entity: decl.name.clone(),
                    action: action.name.clone(),
                    location: action.location.clone().or(location),
                });
            }
            entity.push_action(Action {
                origin: Origin::Declared,
                ..action.clone()
            });
        }

        tracing::debug!(entity = %decl.name, fields = entity.fields().len(), "declared entity");
        self.declared.push(decl.name.clone());
        self.entities.insert(decl.name.clone(), entity);
        self.pending.extend(pending);
        Ok(())
    }

    /// Declare a stdlib catalogue entity with the import's overrides applied.
    pub fn import(&mut self, import: &StdlibImport, registry: &TypeRegistry) -> Result<(), ModelError> {
        let Some(mut decl) = stdlib::stdlib_entity(&import.entity) else {
            return Err(ModelError::UnknownStdlibEntity {
                entity: import.entity.clone(),
                available: stdlib::STDLIB_ENTITIES.join(", "),
                location: import.location.clone(),
            });
        };

        if let Some(schema) = &import.schema {
            decl.schema = schema.clone();
        }

        let reserved = self.reserved_names(&decl.name);
        for name in &import.exclude {
            if reserved.contains(name) {
                return Err(ModelError::InvalidExclusion {
                    entity: decl.name.clone(),
                    name: name.clone(),
                    reason: "synthesized attributes are always present".to_string(),
                    location: import.location.clone(),
                });
            }
            let before = decl.fields.len() + decl.relations.len();
            decl.fields.retain(|f| &f.name != name);
            decl.relations.retain(|r| &r.name != name);
            if decl.fields.len() + decl.relations.len() == before {
                return Err(ModelError::InvalidExclusion {
                    entity: decl.name.clone(),
                    name: name.clone(),
                    reason: "not a member of the catalogue entity".to_string(),
                    location: import.location.clone(),
                });
            }
        }

        for field in &import.extend {
            match decl.fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field.clone(),
                None => decl.fields.push(field.clone()),
            }
        }

        decl.location = import.location.clone();
        self.declare(&decl, registry)
    }

    /// Resolve every queued relation.
    ///
    /// `one` relations go first so that `many` relations can find the
    /// foreign key pointing back at them.
    pub fn wire(&mut self) -> Result<(), ModelError> {
        let pending = std::mem::take(&mut self.pending);
        for relation in pending.iter().filter(|p| p.decl.cardinality == Cardinality::One) {
            self.wire_one(relation)?;
        }
        for relation in pending.iter().filter(|p| p.decl.cardinality == Cardinality::Many) {
            self.wire_many(relation)?;
        }
        Ok(())
    }

    fn target_of(&self, pending: &PendingRelation) -> Result<&Entity, ModelError> {
        self.entities
            .get(&pending.decl.target)
            .ok_or_else(|| ModelError::DanglingReference {
                entity: pending.entity.clone(),
                relation: pending.decl.name.clone(),
                target: pending.decl.target.clone(),
                location: pending.location.clone(),
            })
    }

    fn wire_one(&mut self, pending: &PendingRelation) -> Result<(), ModelError> {
        let target = self.target_of(pending)?;
        let reference = ForeignKeyRef {
            entity: target.name().to_string(),
            table: target.table(),
            column: target.pk_column(),
        };

        let owner = self
            .entities
            .get_mut(&pending.entity)
            .ok_or_else(|| ModelError::UnknownEntity {
                entity: pending.entity.clone(),
            })?;
        let rel = &pending.decl;
        let column = format!("fk_{}", rel.name);
        if owner.column_owner(&column).is_some() {
            return Err(ModelError::DuplicateField {
                entity: pending.entity.clone(),
                name: column,
                location: pending.location.clone(),
            });
        }

        let origin = Origin::Relation(rel.name.clone());
        let mut field = Field::new(&column, "integer", PrimitiveKind::Integer, TargetType::new("INTEGER"))
            .with_role(FieldRole::ForeignKey(reference))
            .with_origin(origin.clone());
        field.nullable = rel.nullable;

        let index = Index::btree(
            format!("idx_{}_{}", owner.table_name(), column),
            vec![column.clone()],
            origin,
        );

        owner.push_field(field);
        owner.push_index(index);
        owner.push_relation(Relation {
            name: rel.name.clone(),
            target: rel.target.clone(),
            cardinality: Cardinality::One,
            nullable: rel.nullable,
            column,
            origin: Origin::Declared,
        });
        Ok(())
    }

    fn wire_many(&mut self, pending: &PendingRelation) -> Result<(), ModelError> {
        let target = self.target_of(pending)?;
        let rel = &pending.decl;
        let unresolved = |reason: &str| ModelError::UnresolvedInverse {
            entity: pending.entity.clone(),
            relation: rel.name.clone(),
            target: rel.target.clone(),
            reason: reason.to_string(),
            location: pending.location.clone(),
        };

        let inverse = match &rel.via {
            Some(via) => target
                .relation(via)
                .filter(|r| r.cardinality == Cardinality::One && r.target == pending.entity)
                .ok_or_else(|| unresolved(&format!("'{}' is not a one relation back to this entity", via)))?,
            None => {
                let mut back = target
                    .relations()
                    .iter()
                    .filter(|r| r.cardinality == Cardinality::One && r.target == pending.entity);
                match (back.next(), back.next()) {
                    (Some(only), None) => only,
                    (None, _) => return Err(unresolved("no one relation points back")),
                    (Some(_), Some(_)) => {
                        return Err(unresolved("several one relations point back; name one with 'via'"))
                    }
                }
            }
        };
        let column = inverse.column.clone();

        let owner = self
            .entities
            .get_mut(&pending.entity)
            .ok_or_else(|| ModelError::UnknownEntity {
                entity: pending.entity.clone(),
            })?;
        owner.push_relation(Relation {
            name: rel.name.clone(),
            target: rel.target.clone(),
            cardinality: Cardinality::Many,
            nullable: true,
            column,
            origin: Origin::Declared,
        });
        Ok(())
    }
}

fn check_name(
    entity: &str,
    name: &str,
    reserved: &[String],
    seen: &[&str],
    location: Option<SourceLocation>,
) -> Result<(), ModelError> {
    if reserved.iter().any(|r| r == name) {
        return Err(ModelError::IdentityOverride {
            entity: entity.to_string(),
            name: name.to_string(),
            location,
        });
    }
    if seen.contains(&name) {
        return Err(ModelError::DuplicateField {
            entity: entity.to_string(),
            name: name.to_string(),
            location,
        });
    }
    Ok(())
}

/// Identifier components must be declared, non-reference fields.
fn identifier_rule(entity: &Entity, decl: &EntityDecl) -> Result<IdentifierRule, ModelError> {
    let mut rule = IdentifierRule::new(entity.snake_name().replace('_', "-"));
    let Some(identifier) = &decl.identifier else {
        return Ok(rule);
    };
    for component in &identifier.components {
        let declared = decl
            .fields
            .iter()
            .any(|f| &f.name == component && f.reference_target().is_none());
        if !declared {
            return Err(ModelError::InvalidIdentifier {
                entity: decl.name.clone(),
                component: component.clone(),
                location: decl.location.clone(),
            });
        }
    }
    rule.components = identifier.components.clone();
    rule.separator = identifier.separator.clone();
    Ok(rule)
}

/// Identity trio plus audit columns.
fn synthesized_fields(entity: &Entity, rule: IdentifierRule, settings: &ModelSettings) -> Vec<Field> {
    let column = |name: &str, type_name: &str, kind: PrimitiveKind, target: &str| {
        Field::new(name, type_name, kind, TargetType::new(target)).with_origin(Origin::Synthesized)
    };

    let mut fields = vec![
        column(&entity.pk_column(), "integer", PrimitiveKind::Integer, "INTEGER")
            .required()
            .with_role(FieldRole::SurrogateKey),
        column(EXTERNAL_ID, "uuid", PrimitiveKind::Uuid, "UUID")
            .required()
            .unique()
            .with_default(ColumnDefault::RandomUuid)
            .with_role(FieldRole::ExternalId),
        column(IDENTIFIER, "text", PrimitiveKind::Text, "TEXT")
            .required()
            .unique()
            .with_role(FieldRole::Identifier(rule)),
    ];

    if settings.audit_fields {
        for name in [CREATED_AT, UPDATED_AT] {
            fields.push(
                column(name, "timestamp", PrimitiveKind::Timestamp, "TIMESTAMPTZ")
                    .required()
                    .with_default(ColumnDefault::Now)
                    .with_role(FieldRole::Audit),
            );
        }
        fields.push(
            column(DELETED_AT, "timestamp", PrimitiveKind::Timestamp, "TIMESTAMPTZ")
                .with_role(FieldRole::Audit),
        );
    }
    fields
}

/// A declared data field and the CHECK constraints its type implies.
fn declared_field(
    entity: &Entity,
    decl: &FieldDecl,
    registry: &TypeRegistry,
    location: Option<SourceLocation>,
) -> Result<(Field, Vec<Constraint>), ModelError> {
    let check_name = format!("chk_{}_{}", entity.table_name(), decl.name);
    let invalid_default = |reason: String| ModelError::InvalidDefault {
        entity: entity.name().to_string(),
        field: decl.name.clone(),
        reason,
        location: location.clone(),
    };

    let (mut field, rule) = if decl.type_name == "enum" {
        let values = decl.values.clone().unwrap_or_default();
        if values.is_empty() {
            return Err(ModelError::InvalidEnum {
                entity: entity.name().to_string(),
                field: decl.name.clone(),
                location,
            });
        }
        let mut field = Field::new(&decl.name, "enum", PrimitiveKind::Text, TargetType::new("TEXT"));
        field.enum_values = Some(values.clone());
        let rule = CheckRule::OneOf {
            column: decl.name.clone(),
            values,
        };
        (field, Some(rule))
    } else {
        let registered = registry.resolve(&decl.type_name).map_err(|_| ModelError::UnknownFieldType {
            entity: entity.name().to_string(),
            field: decl.name.clone(),
            type_name: decl.type_name.clone(),
            location: location.clone(),
        })?;
        let field = Field::new(&decl.name, &decl.type_name, registered.kind(), registered.target());
        let column = decl.name.clone();
        let rule = match registered.predicate() {
            ValuePredicate::Any => None,
            ValuePredicate::Pattern(re) => Some(CheckRule::Matches {
                column,
                pattern: re.as_str().to_string(),
            }),
            ValuePredicate::Range { min, max } => Some(CheckRule::Between {
                column,
                min: *min,
                max: *max,
            }),
            ValuePredicate::OneOf(values) => Some(CheckRule::OneOf {
                column,
                values: values.clone(),
            }),
        };
        (field, rule)
    };

    field.nullable = decl.nullable;
    field.unique = decl.unique;
    field.description = decl.description.clone();

    if let Some(value) = &decl.default {
        let default = ColumnDefault::from_declared(value);
        if let ColumnDefault::Literal(literal) = &default {
            match &field.enum_values {
                Some(values) => {
                    if !literal.as_str().is_some_and(|s| values.iter().any(|v| v == s)) {
                        return Err(invalid_default(format!("{} is not one of the enum values", literal)));
                    }
                }
                None => registry.validate(&decl.type_name, literal).map_err(|e| match e {
                    TypeError::InvalidValue { report, .. } => invalid_default(report.to_string()),
                    other => invalid_default(other.to_string()),
                })?,
            }
        } else if !matches!(
            (&default, field.kind),
            (ColumnDefault::Now, PrimitiveKind::Timestamp | PrimitiveKind::Date)
                | (ColumnDefault::RandomUuid, PrimitiveKind::Uuid)
        ) {
            return Err(invalid_default(format!(
                "{} does not produce a {} value",
                value,
                field.kind.as_str()
            )));
        }
        field.default = Some(default);
    }

    let checks = rule
        .map(|rule| Constraint {
            name: check_name,
            rule: ConstraintRule::Check(rule),
            origin: Origin::Declared,
        })
        .into_iter()
        .collect();
    Ok((field, checks))
}
