//! Target Emitters
//!
//! These emitters implement the TargetEmitter port from the domain layer.
//! They turn ordered artifacts into the text of one target.

pub mod postgres;
pub mod query_metadata;

pub use postgres::PostgresEmitter;
pub use query_metadata::QueryMetadataEmitter;

use crate::domain::ports::TargetEmitter;
use crate::domain::value_objects::{ModelSettings, Target};

/// Get all available emitters
pub fn all_emitters(settings: &ModelSettings) -> Vec<Box<dyn TargetEmitter>> {
    Target::ALL
        .iter()
        .map(|target| get_emitter(*target, settings))
        .collect()
}

/// Get emitter for a specific target
pub fn get_emitter(target: Target, settings: &ModelSettings) -> Box<dyn TargetEmitter> {
    match target {
        Target::Postgres => Box::new(PostgresEmitter::with_settings(settings)),
        Target::QueryMetadata => Box::new(QueryMetadataEmitter::new()),
    }
}
