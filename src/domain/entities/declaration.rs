//! Declarations handed in by a specification loader.
//!
//! These are the boundary objects of a compile run. They derive serde so a
//! loader can deserialize them from whatever format it reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Action, Cardinality, Guard};
use crate::domain::types::TypeDef;
use crate::domain::value_objects::SourceLocation;

fn default_schema() -> String {
    "public".to_string()
}

fn yes() -> bool {
    true
}

fn dash() -> String {
    "-".to_string()
}

/// Everything one compile run consumes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpecBundle {
    /// Name of the input unit, used in diagnostics and events.
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub imports: Vec<StdlibImport>,
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
    /// Pattern instances bound to a set of entities.
    #[serde(default)]
    pub patterns: Vec<BundlePattern>,
}

impl SpecBundle {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            ..Self::default()
        }
    }

    pub fn with_entity(mut self, entity: EntityDecl) -> Self {
        self.entities.push(entity);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub relations: Vec<RelationDecl>,
    #[serde(default)]
    pub guards: Vec<Guard>,
    #[serde(default)]
    pub patterns: Vec<PatternDecl>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// How the human-readable identifier is built; the entity name and the
    /// surrogate key when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<IdentifierDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            description: None,
            fields: Vec::new(),
            relations: Vec::new(),
            guards: Vec::new(),
            patterns: Vec::new(),
            actions: Vec::new(),
            identifier: None,
            location: None,
        }
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: RelationDecl) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn pattern(mut self, name: &str, config: Value) -> Self {
        self.patterns.push(PatternDecl {
            name: name.to_string(),
            config: match config {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            location: None,
        });
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn identifier(mut self, components: &[&str]) -> Self {
        self.identifier = Some(IdentifierDecl {
            components: components.iter().map(|c| c.to_string()).collect(),
            separator: dash(),
        });
        self
    }
}

/// Columns the identifier is composed from, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierDecl {
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default = "dash")]
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Registered type name, `enum` (with `values`) or `ref(Entity)`.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "yes")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl FieldDecl {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            nullable: true,
            default: None,
            values: None,
            unique: false,
            description: None,
            location: None,
        }
    }

    pub fn enumeration(name: &str, values: &[&str]) -> Self {
        let mut decl = Self::new(name, "enum");
        decl.values = Some(values.iter().map(|v| v.to_string()).collect());
        decl
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Target entity of a `ref(Entity)` shorthand.
    pub fn reference_target(&self) -> Option<&str> {
        self.type_name
            .strip_prefix("ref(")
            .and_then(|rest| rest.strip_suffix(')'))
            .map(str::trim)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDecl {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default = "yes")]
    pub nullable: bool,
    /// For `many`: the target's relation that points back here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl RelationDecl {
    pub fn one(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            cardinality: Cardinality::One,
            nullable: true,
            via: None,
            location: None,
        }
    }

    pub fn many(name: &str, target: &str) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(name, target)
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDecl {
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlePattern {
    pub name: String,
    pub entities: Vec<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// Use of a catalogue entity, optionally extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdlibImport {
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub extend: Vec<FieldDecl>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl StdlibImport {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            schema: None,
            extend: Vec::new(),
            exclude: Vec::new(),
            location: None,
        }
    }
}
