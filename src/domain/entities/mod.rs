//! Domain Entities
//!
//! - `Entity` - a business entity with its fields, relations and generated members
//! - `Action` / `Step` - declarative workflows on an entity
//! - `Artifact` - one unit of generated output
//! - `EntityDecl` and friends - what a specification loader hands in

mod action;
mod artifact;
mod declaration;
mod entity;
mod field;
mod relation;
mod rendered_artifact;
mod schema;

pub use action::{Action, ActionInput, Guard, Step};
pub use artifact::{Artifact, ArtifactBody, TableSpec};
pub use declaration::{
    BundlePattern, EntityDecl, FieldDecl, IdentifierDecl, PatternDecl, RelationDecl, SpecBundle,
    StdlibImport,
};
pub use entity::{Entity, CREATED_AT, DELETED_AT, EXTERNAL_ID, IDENTIFIER, UPDATED_AT};
pub use field::{
    slug, ColumnDefault, ComputedRange, Field, FieldRole, ForeignKeyRef, IdentifierRule, Origin,
};
pub use relation::{Cardinality, Relation};
pub use rendered_artifact::RenderedArtifact;
pub use schema::{
    Aggregate, AggregateFunction, CheckRule, Constraint, ConstraintRule, ExclusionElement, Index,
    IndexMethod, RowPredicate, View,
};
