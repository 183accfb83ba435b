//! Dependency Orderer
//!
//! Sorts artifacts so that every artifact follows everything it depends
//! on. Entities are ranked by their foreign keys: a referenced entity's
//! block comes before the referencing entity's. Within that ranking the
//! sort takes the lowest `(entity rank, kind, id)` among ready artifacts,
//! so the output is the same on every run.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use thiserror::Error;

use super::{topological_order, DepthFirst, TraversalError};
use crate::domain::entities::{Artifact, ArtifactBody};
use crate::domain::value_objects::{ArtifactId, ArtifactKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("artifact '{id}' is produced more than once")]
    DuplicateArtifact { id: String },

    #[error("artifact '{artifact}' depends on unknown artifact '{dependency}'")]
    UnresolvedDependency { artifact: String, dependency: String },

    #[error("cyclic dependency: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("shared artifact '{artifact}' depends on entity artifact '{dependency}'")]
    MisplacedDependency { artifact: String, dependency: String },
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::DuplicateArtifact { .. } => "duplicate-artifact",
            OrderError::UnresolvedDependency { .. } => "unresolved-artifact",
            OrderError::Cycle { .. } => "cyclic-dependency",
            OrderError::MisplacedDependency { .. } => "misplaced-dependency",
        }
    }
}

type Rank = (usize, ArtifactKind, ArtifactId);

/// Artifacts in a valid sequential emission order.
pub fn order(artifacts: Vec<Artifact>) -> Result<Vec<Artifact>, OrderError> {
    let mut by_id: BTreeMap<ArtifactId, Artifact> = BTreeMap::new();
    for artifact in artifacts {
        let id = artifact.id().clone();
        if by_id.insert(id.clone(), artifact).is_some() {
            return Err(OrderError::DuplicateArtifact { id: id.to_string() });
        }
    }

    for artifact in by_id.values() {
        for dep in artifact.dependencies() {
            let Some(target) = by_id.get(dep) else {
                return Err(OrderError::UnresolvedDependency {
                    artifact: artifact.id().to_string(),
                    dependency: dep.to_string(),
                });
            };
            if artifact.entity().is_none() && target.entity().is_some() {
                return Err(OrderError::MisplacedDependency {
                    artifact: artifact.id().to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    check_acyclic(&by_id)?;
    let ranks = entity_ranks(&by_id)?;
    let rank = |artifact: &Artifact| -> Rank {
        let entity = artifact
            .entity()
            .and_then(|e| ranks.get(e))
            .map_or(0, |r| r + 1);
        (entity, artifact.kind(), artifact.id().clone())
    };

    let mut waiting: BTreeMap<ArtifactId, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<ArtifactId, Vec<ArtifactId>> = BTreeMap::new();
    let mut ready: BinaryHeap<Reverse<Rank>> = BinaryHeap::new();
    for artifact in by_id.values() {
        let deps = artifact.dependencies();
        waiting.insert(artifact.id().clone(), deps.len());
        for dep in deps {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(artifact.id().clone());
        }
        if deps.is_empty() {
            ready.push(Reverse(rank(artifact)));
        }
    }

    let mut ordered = Vec::with_capacity(by_id.len());
    while let Some(Reverse((_, _, id))) = ready.pop() {
        for dependent in dependents.get(&id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = waiting.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    if let Some(artifact) = by_id.get(dependent) {
                        ready.push(Reverse(rank(artifact)));
                    }
                }
            }
        }
        ordered.push(id);
    }

    let ordered: Vec<Artifact> = ordered
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    tracing::debug!(artifacts = ordered.len(), entities = ranks.len(), "ordered artifacts");
    Ok(ordered)
}

fn cycle(path: Vec<String>) -> OrderError {
    OrderError::Cycle { path }
}

/// Rejects any cycle among artifacts, reporting its path of ids.
fn check_acyclic(by_id: &BTreeMap<ArtifactId, Artifact>) -> Result<(), OrderError> {
    let mut walk = DepthFirst::new();
    let mut successors = |id: &ArtifactId| -> Vec<ArtifactId> {
        by_id
            .get(id)
            .map(|a| a.dependencies().iter().cloned().collect())
            .unwrap_or_default()
    };
    for id in by_id.keys() {
        walk.visit(id, &mut successors).map_err(|e| match e {
            TraversalError::Cycle { path } | TraversalError::DepthExceeded { path, .. } => {
                cycle(path.iter().map(ToString::to_string).collect())
            }
        })?;
    }
    Ok(())
}

/// Position of each entity once referenced entities are placed first.
///
/// Edges come from table artifacts only; a table referencing itself does
/// not count.
fn entity_ranks(
    by_id: &BTreeMap<ArtifactId, Artifact>,
) -> Result<BTreeMap<String, usize>, OrderError> {
    let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for artifact in by_id.values() {
        let Some(entity) = artifact.entity() else { continue };
        let deps = edges.entry(entity.to_string()).or_default();
        if !matches!(artifact.body(), ArtifactBody::Table(_)) {
            continue;
        }
        for dep in artifact.dependencies() {
            if let Some(target) = by_id.get(dep).and_then(|a| a.entity()) {
                if target != entity {
                    deps.insert(target.to_string());
                }
            }
        }
    }
    let order = topological_order(&edges).map_err(|e| match e {
        TraversalError::Cycle { path } | TraversalError::DepthExceeded { path, .. } => cycle(path),
    })?;
    Ok(order
        .into_iter()
        .enumerate()
        .map(|(rank, entity)| (entity, rank))
        .collect())
}
