//! Slowly changing dimension, type 2.
//!
//! Rows are versioned instead of overwritten: a change to a tracked field
//! closes the current version (`effective_to = now()`, `is_current =
//! false`) and inserts a new one. A partial unique index keeps one current
//! version per natural key.

use serde_json::{Map, Value};

use super::{ConfigReader, Fragment, PatternContext, PatternError};
use crate::domain::actions::{Param, Routine, RoutineBody, RoutineKind, VersionSpec};
use crate::domain::entities::{
    ColumnDefault, Entity, Field, FieldRole, Index, IndexMethod, Origin, RowPredicate,
};
use crate::domain::types::{PrimitiveKind, TargetType};

pub const NAME: &str = "scd_type2";

pub(super) fn expand(
    entity: &Entity,
    config: &mut ConfigReader<'_>,
    ctx: &PatternContext<'_>,
) -> Result<Fragment, PatternError> {
    let natural_key = config.required_strings("natural_key")?;
    let tracked_key = config.alias(&["tracked_fields", "track_fields"]);
    let tracked = config.required_strings(tracked_key)?;
    let effective_from = config
        .string("effective_from")?
        .unwrap_or_else(|| "effective_from".to_string());
    let effective_to = config
        .string("effective_to")?
        .unwrap_or_else(|| "effective_to".to_string());
    let is_current = config
        .string("is_current")?
        .unwrap_or_else(|| "is_current".to_string());

    let mut params = Vec::new();
    for (key, names) in [("natural_key", &natural_key), (tracked_key, &tracked)] {
        for name in names {
            let field = entity
                .field(name)
                .filter(|f| f.is_writable())
                .ok_or_else(|| config.invalid(key, format!("'{}' is not a writable field", name)))?;
            let param = Param::new(&field.name, &field.type_name, field.kind, field.target.clone());
            params.push(if key == "natural_key" { param } else { param.optional() });
        }
    }
    if let Some(shared) = tracked.iter().find(|t| natural_key.contains(t)) {
        return Err(config.invalid(
            tracked_key,
            format!("'{}' is part of the natural key", shared),
        ));
    }

    let origin = Origin::Pattern(NAME.to_string());
    let timestamp = |name: &str| {
        Field::new(name, "timestamp", PrimitiveKind::Timestamp, TargetType::new("TIMESTAMPTZ"))
            .with_role(FieldRole::Derived)
            .with_origin(origin.clone())
    };
    let mut fragment = Fragment::default();
    fragment.fields.push(
        timestamp(&effective_from)
            .required()
            .with_default(ColumnDefault::Now),
    );
    fragment.fields.push(timestamp(&effective_to));
    fragment.fields.push(
        Field::new(&is_current, "boolean", PrimitiveKind::Boolean, TargetType::new("BOOLEAN"))
            .required()
            .with_default(ColumnDefault::Literal(Value::Bool(true)))
            .with_role(FieldRole::Derived)
            .with_origin(origin.clone()),
    );
    fragment.indexes.push(Index {
        name: format!(
            "uk_{}_{}_current",
            entity.table_name(),
            natural_key.join("_")
        ),
        columns: natural_key.clone(),
        method: IndexMethod::BTree,
        unique: true,
        predicate: Some(RowPredicate::IsTrue(is_current.clone())),
        origin: origin.clone(),
    });
    fragment.routines.push(
        Routine::generated(
            entity,
            ctx.settings,
            format!("upsert_{}_version", entity.snake_name()),
            RoutineKind::Function,
            RoutineBody::UpsertVersion(VersionSpec {
                natural_key,
                tracked,
                effective_from,
                effective_to,
                is_current,
            }),
            origin,
        )
        .with_params(params)
        .with_description(format!("Record a new {} version when tracked fields change", entity.name())),
    );
    Ok(fragment)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionChange {
    /// No current version for the natural key.
    Insert,
    /// Tracked values are unchanged; nothing is written.
    Unchanged,
    /// Close the current version and insert a new one.
    Supersede,
}

/// What an upsert does given the current version and the incoming values.
///
/// Tracked fields absent from `incoming` keep their current value.
pub fn classify(current: Option<&Map<String, Value>>, incoming: &Map<String, Value>, tracked: &[String]) -> VersionChange {
    let Some(current) = current else {
        return VersionChange::Insert;
    };
    let changed = tracked.iter().any(|field| match incoming.get(field) {
        Some(new) => current.get(field).unwrap_or(&Value::Null) != new,
        None => false,
    });
    if changed {
        VersionChange::Supersede
    } else {
        VersionChange::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityDecl, FieldDecl};
    use crate::domain::services::EntityModel;
    use crate::domain::types::TypeRegistry;
    use crate::domain::value_objects::ModelSettings;
    use serde_json::json;

    fn expand_on(config: Value) -> Result<Fragment, PatternError> {
        let registry = TypeRegistry::builtin().unwrap();
        let settings = ModelSettings::default();
        let mut model = EntityModel::new(settings.clone());
        let decl = EntityDecl::new("Customer", "dim")
            .field(FieldDecl::new("customer_code", "text").required())
            .field(FieldDecl::new("segment", "text"))
            .field(FieldDecl::new("city", "text"));
        model.declare(&decl, &registry).unwrap();
        let map = match config {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let mut reader = ConfigReader::new("Customer", NAME, None, &map);
        let ctx = PatternContext {
            registry: &registry,
            settings: &settings,
            model: None,
        };
        expand(model.entity("Customer").unwrap(), &mut reader, &ctx)
    }

    #[test]
    fn adds_version_columns_index_and_upsert() {
        let fragment = expand_on(json!({
            "natural_key": ["customer_code"],
            "tracked_fields": ["segment", "city"]
        }))
        .unwrap();
        let names: Vec<&str> = fragment.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["effective_from", "effective_to", "is_current"]);
        let index = &fragment.indexes[0];
        assert_eq!(index.name, "uk_tb_customer_customer_code_current");
        assert!(index.unique);
        let upsert = &fragment.routines[0];
        assert_eq!(upsert.name, "upsert_customer_version");
        assert!(upsert.param("customer_code").unwrap().required);
        assert!(!upsert.param("city").unwrap().required);
    }

    #[test]
    fn tracked_fields_must_not_overlap_the_key() {
        let err = expand_on(json!({
            "natural_key": ["customer_code"],
            "tracked_fields": ["customer_code"]
        }))
        .unwrap_err();
        assert_eq!(err.code(), "invalid-config");
    }

    #[test]
    fn classify_versions() {
        let tracked = vec!["segment".to_string()];
        let current = json!({"segment": "smb", "city": "Oslo"});
        let current = current.as_object().unwrap();
        let same = json!({"segment": "smb", "city": "Bergen"});
        let moved = json!({"segment": "enterprise"});
        assert_eq!(classify(None, moved.as_object().unwrap(), &tracked), VersionChange::Insert);
        assert_eq!(
            classify(Some(current), same.as_object().unwrap(), &tracked),
            VersionChange::Unchanged
        );
        assert_eq!(
            classify(Some(current), moved.as_object().unwrap(), &tracked),
            VersionChange::Supersede
        );
    }
}
