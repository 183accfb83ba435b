//! The type registry: one per compile run, read-only once populated.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::{
    catalogue, CompositeDef, CompositeType, RegisteredType, ScalarDef, ScalarType, TargetType,
    TypeDef, TypeError, ValidationReport, ValuePredicate,
};
use crate::domain::services::{DepthFirst, TraversalError};

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, RegisteredType>,
}

impl TypeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the built-in catalogue.
    pub fn builtin() -> Result<Self, TypeError> {
        let mut registry = Self::new();
        registry.register_all(catalogue::builtin_types())?;
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Register one type. Composite members must already be registered.
    pub fn register(&mut self, def: TypeDef) -> Result<(), TypeError> {
        if self.types.contains_key(def.name()) {
            return Err(TypeError::DuplicateType {
                name: def.name().to_string(),
            });
        }
        let registered = match def {
            TypeDef::Scalar(def) => RegisteredType::Scalar(compile_scalar(def)?),
            TypeDef::Composite(def) => {
                if let Some(member) = def.fields.iter().find(|f| f.type_name == def.name) {
                    return Err(TypeError::CyclicComposite {
                        path: vec![def.name.clone(), member.type_name.clone()],
                    });
                }
                RegisteredType::Composite(self.compile_composite(def)?)
            }
        };
        self.types
            .insert(registered.name().to_string(), registered);
        Ok(())
    }

    /// Register a batch whose composites may reference each other in any order.
    ///
    /// Nothing is registered unless the whole batch is valid.
    pub fn register_all(&mut self, defs: Vec<TypeDef>) -> Result<(), TypeError> {
        let mut batch: BTreeMap<String, TypeDef> = BTreeMap::new();
        for def in defs {
            let name = def.name().to_string();
            if self.types.contains_key(&name) || batch.contains_key(&name) {
                return Err(TypeError::DuplicateType { name });
            }
            batch.insert(name, def);
        }

        let members = |name: &String| -> Vec<String> {
            match batch.get(name) {
                Some(TypeDef::Composite(def)) => def
                    .fields
                    .iter()
                    .filter(|f| batch.contains_key(&f.type_name))
                    .map(|f| f.type_name.clone())
                    .collect(),
                _ => Vec::new(),
            }
        };
        let mut walk = DepthFirst::new();
        let mut successors = members;
        for name in batch.keys() {
            walk.visit(name, &mut successors).map_err(|e| match e {
                TraversalError::Cycle { path } | TraversalError::DepthExceeded { path, .. } => {
                    TypeError::CyclicComposite { path }
                }
            })?;
        }

        // Post-order puts members before the composites that use them.
        let mut staged = self.clone();
        for name in walk.finish() {
            if let Some(def) = batch.remove(&name) {
                staged.register(def)?;
            }
        }
        *self = staged;
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&RegisteredType, TypeError> {
        self.types.get(name).ok_or_else(|| TypeError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Column type for a registered type. Total over registered types.
    pub fn to_target_type(&self, name: &str) -> Result<TargetType, TypeError> {
        self.resolve(name).map(RegisteredType::target)
    }

    /// Validate a value, reporting every failing sub-field at once.
    pub fn validate(&self, name: &str, value: &Value) -> Result<(), TypeError> {
        let mut report = ValidationReport::default();
        self.check_value(name, value, "", &mut report)?;
        if report.is_empty() {
            Ok(())
        } else {
            Err(TypeError::InvalidValue {
                type_name: name.to_string(),
                report,
            })
        }
    }

    fn check_value(
        &self,
        name: &str,
        value: &Value,
        path: &str,
        report: &mut ValidationReport,
    ) -> Result<(), TypeError> {
        match self.resolve(name)? {
            RegisteredType::Scalar(scalar) => {
                if let Err(message) = scalar.kind.check_shape(value) {
                    report.push(path, message);
                } else if let Err(message) = scalar.predicate.check(value) {
                    report.push(path, message);
                }
            }
            RegisteredType::Composite(composite) => {
                let Some(object) = value.as_object() else {
                    report.push(path, format!("expected {} object", composite.name));
                    return Ok(());
                };
                for field in &composite.fields {
                    let child = join_path(path, &field.name);
                    match object.get(&field.name) {
                        None | Some(Value::Null) if field.required => {
                            report.push(&child, "required field is missing");
                        }
                        None | Some(Value::Null) => {}
                        Some(v) => self.check_value(&field.type_name, v, &child, report)?,
                    }
                }
                for key in object.keys() {
                    if !composite.fields.iter().any(|f| &f.name == key) {
                        report.push(&join_path(path, key), "unknown field");
                    }
                }
            }
        }
        Ok(())
    }

    fn compile_composite(&self, def: CompositeDef) -> Result<CompositeType, TypeError> {
        if def.fields.is_empty() {
            return Err(TypeError::InvalidDefinition {
                name: def.name,
                reason: "composite type has no fields".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for field in &def.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(TypeError::InvalidDefinition {
                    name: def.name.clone(),
                    reason: format!("sub-field '{}' is declared twice", field.name),
                });
            }
            if !self.types.contains_key(&field.type_name) {
                return Err(TypeError::UnknownType {
                    name: field.type_name.clone(),
                });
            }
        }
        Ok(CompositeType {
            name: def.name,
            fields: def.fields,
            description: def.description,
        })
    }
}

fn compile_scalar(def: ScalarDef) -> Result<ScalarType, TypeError> {
    let invalid = |reason: String| TypeError::InvalidDefinition {
        name: def.name.clone(),
        reason,
    };

    let rules = [
        def.pattern.is_some(),
        def.min.is_some() || def.max.is_some(),
        def.values.is_some(),
    ];
    if rules.iter().filter(|r| **r).count() > 1 {
        return Err(invalid(
            "only one of pattern, min/max or values may be given".to_string(),
        ));
    }

    let predicate = if let Some(pattern) = &def.pattern {
        ValuePredicate::pattern(pattern).map_err(|e| invalid(format!("invalid pattern: {}", e)))?
    } else if def.min.is_some() || def.max.is_some() {
        if !def.kind.is_numeric() {
            return Err(invalid(format!("min/max require a numeric kind, not {}", def.kind)));
        }
        ValuePredicate::Range {
            min: def.min,
            max: def.max,
        }
    } else if let Some(values) = &def.values {
        if values.is_empty() {
            return Err(invalid("values list is empty".to_string()));
        }
        ValuePredicate::OneOf(values.clone())
    } else {
        ValuePredicate::Any
    };

    let target = match &def.target {
        Some(text) => TargetType::parse(text).map_err(|reason| TypeError::UnmappableType {
            name: def.name.clone(),
            reason,
        })?,
        None => def
            .kind
            .default_target()
            .ok_or_else(|| TypeError::UnmappableType {
                name: def.name.clone(),
                reason: format!("{} values cannot be stored directly", def.kind),
            })?,
    };

    Ok(ScalarType {
        name: def.name,
        kind: def.kind,
        predicate,
        target,
        description: def.description,
    })
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}
