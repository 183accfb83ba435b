//! Artifact Builder
//!
//! Turns a resolved model into the flat artifact list the orderer sorts.
//! Dependencies are derived from the structures themselves: foreign keys,
//! tables a routine touches, routines it calls and views it refreshes.

use super::EntityModel;
use crate::domain::actions::{LookupDirection, Param, Routine, RoutineBody, RoutineKind};
use crate::domain::entities::{Artifact, ArtifactBody, Entity, Origin, TableSpec};
use crate::domain::types::{PrimitiveKind, TargetType};
use crate::domain::value_objects::{ArtifactId, ArtifactKind, ModelSettings};

/// Every artifact of the model, unordered.
pub fn build_artifacts(model: &EntityModel) -> Vec<Artifact> {
    let settings = model.settings();
    let mut artifacts = vec![Artifact::new(
        settings.result_type.clone(),
        ArtifactBody::ResultType,
    )];

    for entity in model.entities() {
        let table = entity.table();
        let table_id = ArtifactId::new(ArtifactKind::Table, &table);

        let mut spec = Artifact::new(
            table.clone(),
            ArtifactBody::Table(TableSpec {
                entity: entity.name().to_string(),
                description: entity.description().map(str::to_string),
                fields: entity.fields().to_vec(),
            }),
        )
        .for_entity(entity.name());
        for fk in entity.fields().iter().filter_map(|f| f.foreign_key()) {
            spec = spec.depends_on(ArtifactId::new(ArtifactKind::Table, &fk.table));
        }
        artifacts.push(spec);

        for constraint in entity.constraints() {
            artifacts.push(
                Artifact::new(
                    entity.qualified(&constraint.name),
                    ArtifactBody::Constraint {
                        table: table.clone(),
                        constraint: constraint.clone(),
                    },
                )
                .for_entity(entity.name())
                .depends_on(table_id.clone()),
            );
        }
        for index in entity.indexes() {
            artifacts.push(
                Artifact::new(
                    entity.qualified(&index.name),
                    ArtifactBody::Index {
                        table: table.clone(),
                        index: index.clone(),
                    },
                )
                .for_entity(entity.name())
                .depends_on(table_id.clone()),
            );
        }
        for view in entity.views() {
            artifacts.push(
                Artifact::new(
                    entity.qualified(&view.name),
                    ArtifactBody::View {
                        source: table.clone(),
                        view: view.clone(),
                    },
                )
                .for_entity(entity.name())
                .depends_on(table_id.clone()),
            );
        }

        let helpers = if settings.identity_helpers {
            identity_helpers(entity, settings).to_vec()
        } else {
            Vec::new()
        };
        for routine in entity.routines().iter().chain(&helpers) {
            artifacts.push(routine_artifact(routine, settings));
        }
    }

    tracing::debug!(artifacts = artifacts.len(), "built artifacts");
    artifacts
}

fn routine_artifact(routine: &Routine, settings: &ModelSettings) -> Artifact {
    let mut artifact = Artifact::new(routine.qualified_name(), ArtifactBody::Routine(routine.clone()))
        .for_entity(&routine.entity)
        .for_action(routine.action.clone());
    for table in routine.tables() {
        artifact = artifact.depends_on(ArtifactId::new(ArtifactKind::Table, &table));
    }
    for callee in routine.calls() {
        artifact = artifact.depends_on(ArtifactId::new(ArtifactKind::Routine, &callee));
    }
    for view in routine.refreshes() {
        artifact = artifact.depends_on(ArtifactId::new(ArtifactKind::View, &view));
    }
    if routine.returns_mutation_result() {
        artifact = artifact.depends_on(result_type_id(settings));
    }
    artifact
}

/// `<entity>_pk(p_id uuid)` and `<entity>_id(p_pk integer)`.
pub fn identity_helpers(entity: &Entity, settings: &ModelSettings) -> [Routine; 2] {
    let snake = entity.snake_name();
    let param = |name: &str, kind: PrimitiveKind, target: &str| {
        Param::new(name, kind.as_str(), kind, TargetType::new(target))
    };
    let helper = |name: String, direction: LookupDirection, param: Param| {
        Routine::generated(
            entity,
            settings,
            name,
            RoutineKind::Function,
            RoutineBody::IdentityLookup(direction),
            Origin::Synthesized,
        )
        .with_params(vec![param])
    };
    [
        helper(
            format!("{}_pk", snake),
            LookupDirection::PkFromId,
            param("id", PrimitiveKind::Uuid, "UUID"),
        ),
        helper(
            format!("{}_id", snake),
            LookupDirection::IdFromPk,
            param("pk", PrimitiveKind::Integer, "INTEGER"),
        ),
    ]
}

/// Name of the shared result type as an artifact id.
pub fn result_type_id(settings: &ModelSettings) -> ArtifactId {
    ArtifactId::new(ArtifactKind::Type, &settings.result_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityDecl, FieldDecl, RelationDecl};
    use crate::domain::types::TypeRegistry;

    fn model() -> EntityModel {
        let reg = TypeRegistry::builtin().unwrap();
        let mut model = EntityModel::new(ModelSettings::default());
        model
            .declare(
                &EntityDecl::new("Contact", "crm")
                    .field(FieldDecl::new("email", "email"))
                    .relation(RelationDecl::one("company", "Company")),
                &reg,
            )
            .unwrap();
        model.declare(&EntityDecl::new("Company", "crm"), &reg).unwrap();
        model.wire().unwrap();
        model
    }

    fn ids(artifacts: &[Artifact]) -> Vec<&str> {
        artifacts.iter().map(|a| a.id().as_str()).collect()
    }

    #[test]
    fn tables_depend_on_referenced_tables() {
        let artifacts = build_artifacts(&model());
        let contact = artifacts
            .iter()
            .find(|a| a.id().as_str() == "table:crm.tb_contact")
            .unwrap();
        let deps: Vec<&str> = contact.dependencies().iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["table:crm.tb_company"]);
    }

    #[test]
    fn members_and_helpers_become_artifacts() {
        let artifacts = build_artifacts(&model());
        let ids = ids(&artifacts);
        assert_eq!(ids[0], "type:app.mutation_result");
        for expected in [
            "constraint:crm.chk_tb_contact_email",
            "index:crm.idx_tb_contact_fk_company",
            "routine:crm.contact_pk",
            "routine:crm.contact_id",
        ] {
            assert!(ids.contains(&expected), "{}", expected);
        }
        let helper = artifacts
            .iter()
            .find(|a| a.id().as_str() == "routine:crm.company_pk")
            .unwrap();
        let deps: Vec<&str> = helper.dependencies().iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["table:crm.tb_company"]);
    }

    #[test]
    fn helpers_can_be_disabled() {
        let reg = TypeRegistry::builtin().unwrap();
        let mut model = EntityModel::new(ModelSettings {
            identity_helpers: false,
            ..ModelSettings::default()
        });
        model.declare(&EntityDecl::new("Company", "crm"), &reg).unwrap();
        model.wire().unwrap();
        let artifacts = build_artifacts(&model);
        assert!(artifacts.iter().all(|a| a.kind() != ArtifactKind::Routine));
    }
}
