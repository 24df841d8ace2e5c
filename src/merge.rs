//! Merge paths and retroactive consolidation.
//!
//! When two entities that were treated as distinct turn out to be the same
//! real-world thing, one becomes the master and the other is folded into
//! it. Merge paths are the durable redirects that keep every historical
//! pointer to the duplicate resolving correctly afterwards: a path records
//! the identity it was created under (immutable) and the entity it
//! currently resolves to (redirected in place, never deleted).
//!
//! The engine guarantees resolution only; migrating the duplicate's
//! dependent data (relationships, child records) stays with the caller.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::entity::{EntityId, EntityKind};
use crate::error::{EngineError, EngineResult};
use crate::repository::MergePathStore;

/// Globally unique merge path identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergePathId(Uuid);

impl MergePathId {
    /// Creates a new random merge path ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MergePathId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MergePathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A durable redirect from a historical entity identity to its current
/// resolution target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePath {
    /// Unique identifier.
    pub id: MergePathId,

    /// Which domain type the path belongs to.
    pub kind: EntityKind,

    /// The identity the path was created under. Never changes.
    pub origin: EntityId,

    /// The entity the origin currently resolves to. Redirected in place
    /// during consolidation.
    pub entity_id: EntityId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MergePath {
    /// Creates the identity path for `origin`: a path that resolves to the
    /// origin itself until a consolidation redirects it.
    #[must_use]
    pub fn identity(kind: EntityKind, origin: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: MergePathId::new(),
            kind,
            origin,
            entity_id: origin,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while the path still points at its own origin.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.entity_id == self.origin
    }

    pub(crate) fn redirect_to(&mut self, to: EntityId) {
        self.entity_id = to;
        self.updated_at = Utc::now();
    }
}

/// Outcome of a consolidation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidateReport {
    /// The surviving entity.
    pub master: EntityId,
    /// The entity folded into the master.
    pub duplicate: EntityId,
    /// How many merge paths were redirected.
    pub redirected: usize,
}

/// Folds `duplicate` into `master`.
///
/// Ensures the duplicate has a discoverable path (creating its identity
/// path if none exists yet), then atomically redirects every path pointing
/// at the duplicate to the master. Future lookups through any
/// previously-known path resolve to the master; the duplicate's dependent
/// data is the caller's to migrate.
///
/// # Errors
///
/// [`EngineError::SelfConsolidation`] when `master == duplicate`;
/// repository errors propagate.
pub fn consolidate(
    paths: &dyn MergePathStore,
    kind: &EntityKind,
    master: EntityId,
    duplicate: EntityId,
) -> EngineResult<ConsolidateReport> {
    if master == duplicate {
        return Err(EngineError::SelfConsolidation { id: master });
    }

    paths.ensure(kind, duplicate)?;
    let redirected = paths.redirect(kind, duplicate, master)?;

    info!(
        kind = %kind,
        %master,
        %duplicate,
        redirected,
        "consolidated duplicate entity into master"
    );

    Ok(ConsolidateReport {
        master,
        duplicate,
        redirected,
    })
}

/// Resolves an entity id through the merge path map.
///
/// Ids without a path resolve to themselves. A single lookup suffices:
/// consolidation rewrites every pointer at once, so paths never chain.
pub fn resolve_entity(
    paths: &dyn MergePathStore,
    kind: &EntityKind,
    id: EntityId,
) -> EngineResult<EntityId> {
    Ok(paths.resolve(kind, id)?.unwrap_or(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryMergePathStore;

    fn kind() -> EntityKind {
        EntityKind::new("home")
    }

    #[test]
    fn test_identity_path() {
        let origin = EntityId::new();
        let path = MergePath::identity(kind(), origin);
        assert!(path.is_identity());
        assert_eq!(path.entity_id, origin);
    }

    #[test]
    fn test_consolidate_redirects_duplicate() {
        let store = InMemoryMergePathStore::new();
        let master = EntityId::new();
        let duplicate = EntityId::new();

        let report = consolidate(&store, &kind(), master, duplicate).unwrap();
        assert_eq!(report.redirected, 1);
        assert_eq!(
            resolve_entity(&store, &kind(), duplicate).unwrap(),
            master
        );
    }

    #[test]
    fn test_self_consolidation_is_rejected() {
        let store = InMemoryMergePathStore::new();
        let id = EntityId::new();
        let err = consolidate(&store, &kind(), id, id).unwrap_err();
        assert!(matches!(err, EngineError::SelfConsolidation { .. }));
    }

    #[test]
    fn test_unmerged_id_resolves_to_itself() {
        let store = InMemoryMergePathStore::new();
        let id = EntityId::new();
        assert_eq!(resolve_entity(&store, &kind(), id).unwrap(), id);
    }

    #[test]
    fn test_merge_transitivity() {
        let store = InMemoryMergePathStore::new();
        let a = EntityId::new();
        let b = EntityId::new();
        let c = EntityId::new();

        // C was folded into B, then B into A: C's original path must now
        // resolve to A.
        consolidate(&store, &kind(), b, c).unwrap();
        consolidate(&store, &kind(), a, b).unwrap();

        assert_eq!(resolve_entity(&store, &kind(), c).unwrap(), a);
        assert_eq!(resolve_entity(&store, &kind(), b).unwrap(), a);
        assert_eq!(resolve_entity(&store, &kind(), a).unwrap(), a);
    }
}
