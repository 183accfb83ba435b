//! Every entity carries the identity trio.

use serde_json::json;
use strata::domain::entities::{Action, ArtifactBody, EntityDecl, FieldDecl, FieldRole, Step};
use strata::{CompilePipeline, SpecBundle, Target};

use crate::common::*;

const FIXTURES: [&str; 6] = ["sales", "purchasing", "bookings", "catalog", "customers", "crm"];

/// CONTRACT: Exactly one surrogate key, external id and identifier per table
#[test]
fn contract_every_table_has_identity_trio() {
    for name in FIXTURES {
        let output = compile(name);
        let mut tables = 0;
        for artifact in &output.artifacts {
            let ArtifactBody::Table(spec) = artifact.body() else {
                continue;
            };
            tables += 1;
            let count = |wanted: fn(&FieldRole) -> bool| spec.fields.iter().filter(|f| wanted(&f.role)).count();
            assert_eq!(count(|r| matches!(r, FieldRole::SurrogateKey)), 1, "{}", artifact.id());
            assert_eq!(count(|r| matches!(r, FieldRole::ExternalId)), 1, "{}", artifact.id());
            assert_eq!(count(|r| matches!(r, FieldRole::Identifier(_))), 1, "{}", artifact.id());
            assert_eq!(spec.fields[1].name, "id");
            assert_eq!(spec.fields[2].name, "identifier");
        }
        assert!(tables > 0, "{} has no tables", name);
    }
}

/// CONTRACT: An entity without fields still gets the trio
#[test]
fn contract_empty_entity_has_identity() {
    let bundle = SpecBundle::new("empty").with_entity(EntityDecl::new("Marker", "app"));
    let output = CompilePipeline::default().run(&bundle).unwrap();

    let Some(ArtifactBody::Table(spec)) = output.artifact("table:app.tb_marker").map(|a| a.body()) else {
        panic!("missing table");
    };
    let names: Vec<&str> = spec.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["pk_marker", "id", "identifier", "created_at", "updated_at", "deleted_at"]
    );
}

/// CONTRACT: Declaring a field over an identity column is an error
#[test]
fn contract_identity_cannot_be_redeclared() {
    for reserved in ["id", "identifier", "pk_marker"] {
        let bundle = SpecBundle::new("clash").with_entity(
            EntityDecl::new("Marker", "app").field(FieldDecl::new(reserved, "text")),
        );
        let failure = CompilePipeline::default().run(&bundle).unwrap_err();
        assert_eq!(failure.code(), "identity-override", "{}", reserved);
    }
}

/// CONTRACT: The sandbox hands out a fresh external id per row
#[test]
fn contract_external_ids_are_unique() {
    let mut sb = sandbox("crm");
    let a = sb.insert("Company", json!({"name": "Acme"})).unwrap();
    let b = sb.insert("Company", json!({"name": "Acme"})).unwrap();

    assert_ne!(id_of(&a), id_of(&b));
    assert_ne!(a["pk_company"], b["pk_company"]);
    assert_ne!(a["identifier"], b["identifier"]);
}

/// CONTRACT: Every stored row has an identifier, whoever wrote it
#[test]
fn contract_identifier_is_never_null() {
    let mut sb = sandbox("crm");
    let company = sb.insert("Company", json!({"name": "Acme"})).unwrap();
    let contact = sb
        .insert("Contact", json!({"email": "jo@acme.test", "fk_company": company["pk_company"]}))
        .unwrap();

    assert_eq!(company["identifier"], json!("company-1"));
    assert_eq!(contact["identifier"], json!("contact-1"));
    for entity in ["Company", "Contact"] {
        assert!(sb.rows(entity).iter().all(|r| r["identifier"].is_string()), "{}", entity);
    }

    let script = compile("crm").script(Target::Postgres);
    assert!(script.contains("identifier TEXT NOT NULL UNIQUE"));
    assert!(script.contains("CREATE TRIGGER trg_set_tb_company_identifier"));
}

/// CONTRACT: Declared components shape the identifier
#[test]
fn contract_identifier_from_components() {
    let bundle = SpecBundle::new("tags").with_entity(
        EntityDecl::new("Tag", "crm")
            .field(FieldDecl::new("label", "text"))
            .identifier(&["label"]),
    );
    let output = CompilePipeline::default().run(&bundle).unwrap();
    let mut sb = strata::Sandbox::from_output(&output);

    let tag = sb.insert("Tag", json!({"label": "Key Account"})).unwrap();
    assert_eq!(tag["identifier"], json!("key-account"));
    let blank = sb.insert("Tag", json!({})).unwrap();
    assert_eq!(blank["identifier"], json!("tag-2"));
}

/// CONTRACT: Actions cannot assign the identifier
#[test]
fn contract_identifier_is_read_only() {
    let bundle = SpecBundle::new("tags").with_entity(
        EntityDecl::new("Tag", "crm")
            .field(FieldDecl::new("label", "text"))
            .action(Action::new("rename", vec![Step::update(&[("identifier", "'vip'")])])),
    );
    let failure = CompilePipeline::default().run(&bundle).unwrap_err();
    assert_eq!(failure.code(), "read-only-field");
}
