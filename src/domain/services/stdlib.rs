//! Catalogue of pre-declared entities that bundles can import.

use crate::domain::entities::{EntityDecl, FieldDecl, RelationDecl};

pub const STDLIB_ENTITIES: [&str; 3] = ["Contact", "Currency", "Organization"];

const SCHEMA: &str = "common";

pub fn stdlib_entity(name: &str) -> Option<EntityDecl> {
    let decl = match name {
        "Organization" => EntityDecl::new("Organization", SCHEMA)
            .field(FieldDecl::new("name", "text").required())
            .field(FieldDecl::new("legal_name", "text"))
            .field(FieldDecl::new("website", "url"))
            .field(FieldDecl::new("email", "email"))
            .field(FieldDecl::new("phone", "phoneNumber"))
            .field(FieldDecl::new("address", "SimpleAddress")),
        "Contact" => EntityDecl::new("Contact", SCHEMA)
            .field(FieldDecl::new("first_name", "text").required())
            .field(FieldDecl::new("last_name", "text").required())
            .field(FieldDecl::new("email", "email"))
            .field(FieldDecl::new("phone", "phoneNumber"))
            .relation(RelationDecl::one("organization", "Organization")),
        "Currency" => EntityDecl::new("Currency", SCHEMA)
            .field(FieldDecl::new("code", "text").required().unique())
            .field(FieldDecl::new("name", "text").required())
            .field(FieldDecl::new("symbol", "text"))
            .field(FieldDecl::new("decimal_places", "integer").with_default(serde_json::json!(2))),
        _ => return None,
    };
    Some(decl)
}
