//! Relations between entities.

use serde::{Deserialize, Serialize};

use super::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// A wired relation.
///
/// `one` relations own a foreign key column on this entity; `many`
/// relations are read through the inverse foreign key on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub nullable: bool,
    /// Foreign key column: on this entity for `one`, on the target for `many`.
    pub column: String,
    pub origin: Origin,
}

impl Relation {
    pub fn is_self_reference(&self, owner: &str) -> bool {
        self.target == owner
    }
}
