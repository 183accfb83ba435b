//! Template inheritance over a self-referencing relation.
//!
//! A row names another row of the same entity as its template. Resolving a
//! row walks the chain towards the root and takes, for every inherited
//! field, the nearest non-null value: the child overrides its template,
//! which overrides its own template.

use serde_json::{Map, Value};

use super::{self_link, ConfigReader, Fragment, PatternContext, PatternError};
use crate::domain::actions::{ChainWalk, Routine, RoutineBody, RoutineKind};
use crate::domain::entities::{Entity, Origin};
use crate::domain::services::{CyclePolicy, DepthFirst, TraversalError};

pub const NAME: &str = "template_inheritance";

pub(super) fn expand(
    entity: &Entity,
    config: &mut ConfigReader<'_>,
    ctx: &PatternContext<'_>,
) -> Result<Fragment, PatternError> {
    let relation = config
        .string("template_field")?
        .unwrap_or_else(|| "template".to_string());
    let max_depth = config
        .count("max_depth")?
        .unwrap_or(ctx.settings.template_max_depth);
    let fields = config.required_strings("inherited_fields")?;

    let (link_column, mut fragment) = self_link(entity, &relation, NAME, config, "template_field")?;
    for name in &fields {
        let ok = entity
            .field(name)
            .is_some_and(|f| f.is_writable() && !f.is_identity() && f.name != link_column);
        if !ok {
            return Err(config.invalid(
                "inherited_fields",
                format!("'{}' is not an inheritable field", name),
            ));
        }
    }

    let walk = ChainWalk {
        link_column,
        fields,
        max_depth,
        policy: CyclePolicy::Reject,
    };
    let origin = Origin::Pattern(NAME.to_string());
    let snake = entity.snake_name();

    fragment.routines.push(
        Routine::generated(
            entity,
            ctx.settings,
            format!("resolve_template_{}", snake),
            RoutineKind::Function,
            RoutineBody::ResolveTemplate(walk.clone()),
            origin.clone(),
        )
        .targeting_row()
        .with_description(format!("Merged {} values along the template chain", entity.name())),
    );
    fragment.routines.push(
        Routine::generated(
            entity,
            ctx.settings,
            format!("validate_template_{}", snake),
            RoutineKind::Trigger,
            RoutineBody::ValidateTemplate(walk),
            origin,
        )
        .with_description(format!("Reject cyclic or over-deep {} templates", entity.name())),
    );
    Ok(fragment)
}

/// Chain from `start` to its root, `start` first.
///
/// Fails on a revisited node or when the root is more than `max_depth`
/// hops away.
pub fn resolve_chain<K, F>(start: &K, mut parent: F, max_depth: usize) -> Result<Vec<K>, TraversalError<K>>
where
    K: Ord + Clone,
    F: FnMut(&K) -> Option<K>,
{
    let mut walk = DepthFirst::new().with_max_depth(max_depth);
    walk.visit(start, &mut |k: &K| parent(k))?;
    let mut chain = walk.finish();
    chain.reverse();
    Ok(chain)
}

/// Merge inherited `fields` over a chain given child first.
pub fn merge_chain(chain: &[&Map<String, Value>], fields: &[String]) -> Map<String, Value> {
    let mut merged = Map::new();
    for field in fields {
        let value = chain
            .iter()
            .find_map(|row| row.get(field).filter(|v| !v.is_null()))
            .cloned()
            .unwrap_or(Value::Null);
        merged.insert(field.clone(), value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityDecl, FieldDecl, RelationDecl};
    use crate::domain::services::EntityModel;
    use crate::domain::types::TypeRegistry;
    use crate::domain::value_objects::ModelSettings;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn expand_on(decl: EntityDecl, config: Value) -> Result<Fragment, PatternError> {
        let registry = TypeRegistry::builtin().unwrap();
        let settings = ModelSettings::default();
        let mut model = EntityModel::new(settings.clone());
        model.declare(&decl, &registry).unwrap();
        model.wire().unwrap();
        let map = match config {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let mut reader = ConfigReader::new(&decl.name, NAME, None, &map);
        let ctx = PatternContext {
            registry: &registry,
            settings: &settings,
            model: None,
        };
        expand(model.entity(&decl.name).unwrap(), &mut reader, &ctx)
    }

    fn plan() -> EntityDecl {
        EntityDecl::new("Plan", "billing")
            .field(FieldDecl::new("price", "money"))
            .field(FieldDecl::new("seats", "integer"))
    }

    #[test]
    fn adds_link_and_routines() {
        let fragment = expand_on(plan(), json!({"inherited_fields": ["price", "seats"]})).unwrap();
        assert_eq!(fragment.fields[0].name, "fk_template");
        assert_eq!(fragment.relations[0].target, "Plan");
        let names: Vec<&str> = fragment.routines.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["resolve_template_plan", "validate_template_plan"]);
        let RoutineBody::ResolveTemplate(walk) = &fragment.routines[0].body else {
            panic!("expected resolve body");
        };
        assert_eq!(walk.max_depth, 5);
    }

    #[test]
    fn reuses_declared_self_relation() {
        let decl = plan().relation(RelationDecl::one("parent", "Plan"));
        let fragment = expand_on(
            decl,
            json!({"template_field": "parent", "inherited_fields": ["price"], "max_depth": 2}),
        )
        .unwrap();
        assert!(fragment.fields.is_empty());
        let RoutineBody::ValidateTemplate(walk) = &fragment.routines[1].body else {
            panic!("expected validate body");
        };
        assert_eq!(walk.link_column, "fk_parent");
        assert_eq!(walk.max_depth, 2);
    }

    #[test]
    fn rejects_non_inheritable_fields() {
        let err = expand_on(plan(), json!({"inherited_fields": ["id"]})).unwrap_err();
        assert_eq!(err.code(), "invalid-config");
        let err = expand_on(plan(), json!({})).unwrap_err();
        assert!(err.to_string().contains("inherited_fields"));
    }

    #[test]
    fn chain_and_merge() {
        let parents = BTreeMap::from([("A", "B"), ("B", "C")]);
        let chain = resolve_chain(&"A", |k| parents.get(k).copied(), 5).unwrap();
        assert_eq!(chain, vec!["A", "B", "C"]);

        let a = json!({"price": null, "seats": 3}).as_object().cloned().unwrap();
        let b = json!({"price": 20, "seats": 5}).as_object().cloned().unwrap();
        let c = json!({"price": 10, "seats": 1}).as_object().cloned().unwrap();
        let merged = merge_chain(&[&a, &b, &c], &["price".into(), "seats".into()]);
        assert_eq!(merged["price"], json!(20));
        assert_eq!(merged["seats"], json!(3));
    }

    #[test]
    fn cycles_and_depth() {
        let cyclic = BTreeMap::from([("A", "B"), ("B", "C"), ("C", "A")]);
        let err = resolve_chain(&"A", |k| cyclic.get(k).copied(), 5).unwrap_err();
        assert_eq!(
            err,
            TraversalError::Cycle {
                path: vec!["A", "B", "C", "A"]
            }
        );

        let long = BTreeMap::from([("A", "B"), ("B", "C"), ("C", "D")]);
        assert!(resolve_chain(&"A", |k| long.get(k).copied(), 3).is_ok());
        assert!(matches!(
            resolve_chain(&"A", |k| long.get(k).copied(), 2),
            Err(TraversalError::DepthExceeded { limit: 2, .. })
        ));
    }
}
