//! Type definitions: the declared form handed in by a loader and the
//! registered form held by the registry.

use serde::{Deserialize, Serialize};

use super::{PrimitiveKind, TargetType, ValuePredicate};

/// A type declaration as supplied by a specification loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum TypeDef {
    Scalar(ScalarDef),
    Composite(CompositeDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Scalar(def) => &def.name,
            TypeDef::Composite(def) => &def.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub kind: PrimitiveKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    /// Column type override, e.g. `NUMERIC(19,4)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ScalarDef {
    pub fn new(name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pattern: None,
            min: None,
            max: None,
            values: None,
            target: None,
            description: None,
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_values(mut self, values: &[&str]) -> Self {
        self.values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDef {
    pub name: String,
    pub fields: Vec<SubFieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CompositeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            description: None,
        }
    }

    pub fn required(mut self, name: &str, type_name: &str) -> Self {
        self.fields.push(SubFieldDef::new(name, type_name, true));
        self
    }

    pub fn optional(mut self, name: &str, type_name: &str) -> Self {
        self.fields.push(SubFieldDef::new(name, type_name, false));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl SubFieldDef {
    pub fn new(name: &str, type_name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            required,
        }
    }
}

/// A scalar type after registration: predicate compiled, target resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarType {
    pub name: String,
    pub kind: PrimitiveKind,
    pub predicate: ValuePredicate,
    pub target: TargetType,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    pub name: String,
    pub fields: Vec<SubFieldDef>,
    pub description: Option<String>,
}

/// Entry in the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisteredType {
    Scalar(ScalarType),
    Composite(CompositeType),
}

impl RegisteredType {
    pub fn name(&self) -> &str {
        match self {
            RegisteredType::Scalar(t) => &t.name,
            RegisteredType::Composite(t) => &t.name,
        }
    }

    /// Composite values are stored as JSON documents.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            RegisteredType::Scalar(t) => t.kind,
            RegisteredType::Composite(_) => PrimitiveKind::Json,
        }
    }

    pub fn target(&self) -> TargetType {
        match self {
            RegisteredType::Scalar(t) => t.target.clone(),
            RegisteredType::Composite(_) => TargetType::new("JSONB"),
        }
    }

    pub fn predicate(&self) -> &ValuePredicate {
        static ANY: ValuePredicate = ValuePredicate::Any;
        match self {
            RegisteredType::Scalar(t) => &t.predicate,
            RegisteredType::Composite(_) => &ANY,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, RegisteredType::Composite(_))
    }
}
