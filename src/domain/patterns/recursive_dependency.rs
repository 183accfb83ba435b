//! Recursive dependency validation.
//!
//! Dependencies live either in a self-referencing `one` relation (one
//! dependency per row) or, with `dependency_entity`, in a link entity whose
//! rows are edges between two rows of the owner. Under `reject` a write
//! that would close a cycle fails; under `allow` cycles are tolerated and
//! the closure simply stops at visited rows.

use super::{self_link, ConfigReader, Fragment, PatternContext, PatternError};
use crate::domain::actions::{DependencyLink, DependencyWalk, Routine, RoutineBody, RoutineKind, TableRef};
use crate::domain::entities::{Cardinality, Entity, Origin, Relation};
use crate::domain::services::{CyclePolicy, DepthFirst, TraversalError};

pub const NAME: &str = "recursive_dependency";

pub(super) fn expand(
    entity: &Entity,
    config: &mut ConfigReader<'_>,
    ctx: &PatternContext<'_>,
) -> Result<Fragment, PatternError> {
    let key = config.alias(&["dependency_field", "parent_field"]);
    let relation = config
        .string(key)?
        .unwrap_or_else(|| "depends_on".to_string());
    let link_entity = config.string("dependency_entity")?;
    let source = config.string("source_field")?;
    let policy = match config.choice("cycle_policy", &["reject", "allow"], "reject")?.as_str() {
        "allow" => CyclePolicy::Allow,
        _ => CyclePolicy::Reject,
    };
    let max_depth = config
        .count("max_depth")?
        .unwrap_or(ctx.settings.dependency_max_depth);

    let (link, mut fragment, edges) = match link_entity {
        Some(name) => {
            let (link, edges) = edge_link(entity, &name, &relation, source.as_deref(), config, ctx, key)?;
            (link, Fragment::default(), Some(edges))
        }
        None => {
            if source.is_some() {
                return Err(config.invalid("source_field", "only applies with 'dependency_entity'"));
            }
            let (column, fragment) = self_link(entity, &relation, NAME, config, key)?;
            (DependencyLink::Column(column), fragment, None)
        }
    };
    let walk = DependencyWalk {
        link,
        max_depth,
        policy,
    };
    let origin = Origin::Pattern(NAME.to_string());
    let snake = entity.snake_name();

    fragment.routines.push(
        Routine::generated(
            entity,
            ctx.settings,
            format!("dependencies_of_{}", snake),
            RoutineKind::Function,
            RoutineBody::DependencyClosure(walk.clone()),
            origin.clone(),
        )
        .targeting_row()
        .with_description(format!("Transitive {} dependencies", entity.name())),
    );
    if policy == CyclePolicy::Reject {
        let mut validator = Routine::generated(
            entity,
            ctx.settings,
            format!("validate_dependencies_{}", snake),
            RoutineKind::Trigger,
            RoutineBody::ValidateDependencies(walk),
            origin,
        )
        .with_description(format!("Reject cyclic {} dependencies", entity.name()));
        // Edges are written to the link table, so the check fires there.
        if let Some(edges) = edges {
            validator.table = edges;
        }
        fragment.routines.push(validator);
    }
    Ok(fragment)
}

/// Resolve the two relations of `link_entity` that point back at `entity`.
fn edge_link(
    entity: &Entity,
    link_entity: &str,
    to_relation: &str,
    from_relation: Option<&str>,
    config: &ConfigReader<'_>,
    ctx: &PatternContext<'_>,
    key: &str,
) -> Result<(DependencyLink, TableRef), PatternError> {
    let link = ctx
        .model
        .and_then(|m| m.entity(link_entity))
        .ok_or_else(|| config.invalid("dependency_entity", format!("entity '{}' is not declared", link_entity)))?;
    let back = |r: &&Relation| r.cardinality == Cardinality::One && r.target == entity.name();

    let to = link.relation(to_relation).filter(back).ok_or_else(|| {
        config.invalid(
            key,
            format!("'{}' must be a one relation from {} to {}", to_relation, link_entity, entity.name()),
        )
    })?;
    let from = match from_relation {
        Some(name) => link.relation(name).filter(back).ok_or_else(|| {
            config.invalid(
                "source_field",
                format!("'{}' must be a one relation from {} to {}", name, link_entity, entity.name()),
            )
        })?,
        None => {
            let mut others = link.relations().iter().filter(back).filter(|r| r.name != to.name);
            match (others.next(), others.next()) {
                (Some(only), None) => only,
                (None, _) => {
                    return Err(config.invalid(
                        "dependency_entity",
                        format!("{} needs a second one relation to {}", link_entity, entity.name()),
                    ))
                }
                (Some(_), Some(_)) => {
                    return Err(config.invalid(
                        "source_field",
                        format!("{} has several candidate relations; name one", link_entity),
                    ))
                }
            }
        }
    };
    if from.name == to.name {
        return Err(config.invalid("source_field", "must differ from the dependency relation"));
    }
    let table = TableRef::of(link, ctx.settings);
    Ok((
        DependencyLink::Edges {
            table: table.clone(),
            from_column: from.column.clone(),
            to_column: to.column.clone(),
        },
        table,
    ))
}

/// Every node reachable from `start`, excluding `start`, in sorted order.
pub fn closure<K, F, I>(
    start: &K,
    mut successors: F,
    policy: CyclePolicy,
    max_depth: usize,
) -> Result<Vec<K>, TraversalError<K>>
where
    K: Ord + Clone,
    F: FnMut(&K) -> I,
    I: IntoIterator<Item = K>,
{
    let mut walk = DepthFirst::new().with_policy(policy).with_max_depth(max_depth);
    walk.visit(start, &mut |k: &K| successors(k))?;
    let mut reached: Vec<K> = walk.finish().into_iter().filter(|k| k != start).collect();
    reached.sort();
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityDecl, RelationDecl};
    use crate::domain::services::EntityModel;
    use crate::domain::types::TypeRegistry;
    use crate::domain::value_objects::ModelSettings;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn expand_on(config: Value) -> Result<Fragment, PatternError> {
        let registry = TypeRegistry::builtin().unwrap();
        let settings = ModelSettings::default();
        let mut model = EntityModel::new(settings.clone());
        model.declare(&EntityDecl::new("Task", "work"), &registry).unwrap();
        let map = match config {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let mut reader = ConfigReader::new("Task", NAME, None, &map);
        let ctx = PatternContext {
            registry: &registry,
            settings: &settings,
            model: None,
        };
        expand(model.entity("Task").unwrap(), &mut reader, &ctx)
    }

    fn features() -> (TypeRegistry, ModelSettings, EntityModel) {
        let registry = TypeRegistry::builtin().unwrap();
        let settings = ModelSettings::default();
        let mut model = EntityModel::new(settings.clone());
        model.declare(&EntityDecl::new("Feature", "work"), &registry).unwrap();
        model
            .declare(
                &EntityDecl::new("FeatureRequirement", "work")
                    .relation(RelationDecl::one("feature", "Feature"))
                    .relation(RelationDecl::one("requires", "Feature")),
                &registry,
            )
            .unwrap();
        model.wire().unwrap();
        (registry, settings, model)
    }

    fn expand_edges(config: Value) -> Result<Fragment, PatternError> {
        let (registry, settings, model) = features();
        let map = match config {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let mut reader = ConfigReader::new("Feature", NAME, None, &map);
        let ctx = PatternContext {
            registry: &registry,
            settings: &settings,
            model: Some(&model),
        };
        expand(model.entity("Feature").unwrap(), &mut reader, &ctx)
    }

    #[test]
    fn reject_policy_adds_validator() {
        let fragment = expand_on(json!({"dependency_field": "blocked_by"})).unwrap();
        assert_eq!(fragment.fields[0].name, "fk_blocked_by");
        let names: Vec<&str> = fragment.routines.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["dependencies_of_task", "validate_dependencies_task"]);
    }

    #[test]
    fn allow_policy_has_no_validator() {
        let fragment = expand_on(json!({"cycle_policy": "allow", "max_depth": 4})).unwrap();
        assert_eq!(fragment.routines.len(), 1);
        let RoutineBody::DependencyClosure(walk) = &fragment.routines[0].body else {
            panic!("expected closure body");
        };
        assert_eq!(walk.policy, CyclePolicy::Allow);
        assert_eq!(walk.link, DependencyLink::Column("fk_depends_on".to_string()));
    }

    #[test]
    fn link_entity_supplies_edges() {
        let fragment = expand_edges(json!({
            "dependency_entity": "FeatureRequirement",
            "dependency_field": "requires",
        }))
        .unwrap();
        assert!(fragment.fields.is_empty());
        let RoutineBody::DependencyClosure(walk) = &fragment.routines[0].body else {
            panic!("expected closure body");
        };
        let DependencyLink::Edges { table, from_column, to_column } = &walk.link else {
            panic!("expected edge link");
        };
        assert_eq!(table.entity, "FeatureRequirement");
        assert_eq!(from_column, "fk_feature");
        assert_eq!(to_column, "fk_requires");

        let validator = &fragment.routines[1];
        assert_eq!(validator.table.entity, "FeatureRequirement");
        assert!(fragment.routines[0].tables().contains(&table.table));
    }

    #[test]
    fn link_entity_must_point_back_twice() {
        let err = expand_edges(json!({
            "dependency_entity": "FeatureRequirement",
            "dependency_field": "missing",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("missing"));

        let err = expand_edges(json!({
            "dependency_entity": "FeatureRequirement",
            "dependency_field": "requires",
            "source_field": "requires",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("source_field"));
    }

    #[test]
    fn source_field_needs_link_entity() {
        assert!(expand_on(json!({"source_field": "x"})).is_err());
    }

    #[test]
    fn closure_excludes_start() {
        let edges = BTreeMap::from([("a", vec!["b", "c"]), ("b", vec!["d"]), ("c", vec!["d"])]);
        let next = |k: &&str| edges.get(k).cloned().unwrap_or_default();
        assert_eq!(
            closure(&"a", next, CyclePolicy::Reject, 10).unwrap(),
            vec!["b", "c", "d"]
        );
    }

    #[test]
    fn closure_cycles_follow_policy() {
        let edges = BTreeMap::from([("a", vec!["b"]), ("b", vec!["a"])]);
        let next = |k: &&str| edges.get(k).cloned().unwrap_or_default();
        assert!(matches!(
            closure(&"a", next, CyclePolicy::Reject, 10),
            Err(TraversalError::Cycle { .. })
        ));
        assert_eq!(closure(&"a", next, CyclePolicy::Allow, 10).unwrap(), vec!["b"]);
    }
}
