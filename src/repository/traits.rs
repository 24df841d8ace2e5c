//! Abstract repository traits.
//!
//! These traits define the contract the engine needs from the surrounding
//! datastore. The engine is a pure consumer: it never issues raw
//! storage-specific queries beyond the candidate-window predicate shape
//! below, so backends can be in-memory maps, SQL tables, or anything else
//! that can filter on a kind, a fingerprint band, and field equality.

use thiserror::Error;

use crate::candidate::Candidate;
use crate::entity::{EntityId, EntityKind, EntityRecord};
use crate::field::{FieldMap, FieldValue};
use crate::fingerprint::FingerprintWindow;
use crate::merge::MergePath;
use crate::proto::{ProtoId, ProtoRecord};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Proto record not found.
    #[error("Proto record not found: {0}")]
    ProtoNotFound(ProtoId),

    /// A natural-key or id uniqueness constraint was violated.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Repository backend error: {0}")]
    Backend(String),
}

/// Predicate shape for bounded candidate-window fetches.
///
/// The window is the engine's only backpressure mechanism: `cap` bounds how
/// many records a discovery pass will ever pull, and the fingerprint band
/// culls the table before any expensive comparison runs.
#[derive(Debug, Clone)]
pub struct CandidateWindow {
    /// Inclusive fingerprint band; `None` fetches regardless of fingerprint.
    pub band: Option<FingerprintWindow>,

    /// Include records whose cached fingerprint is unset so they can be
    /// backfilled. Always true when called from discovery.
    pub include_unprofiled: bool,

    /// Entity id to exclude (self-match guard during re-scans).
    pub exclude: Option<EntityId>,

    /// Extra field equality predicates, passed through opaquely.
    pub equals: Vec<(String, FieldValue)>,

    /// Hard cap on the number of records returned.
    pub cap: usize,
}

impl CandidateWindow {
    /// Creates a window over a fingerprint band with the given cap.
    #[must_use]
    pub fn banded(band: FingerprintWindow, cap: usize) -> Self {
        Self {
            band: Some(band),
            include_unprofiled: true,
            exclude: None,
            equals: Vec::new(),
            cap,
        }
    }

    /// Excludes a specific entity id from the window.
    #[must_use]
    pub fn excluding(mut self, id: Option<EntityId>) -> Self {
        self.exclude = id;
        self
    }

    /// Adds extra equality predicates.
    #[must_use]
    pub fn with_equals(mut self, equals: Vec<(String, FieldValue)>) -> Self {
        self.equals = equals;
        self
    }
}

/// Storage contract for one entity kind's table.
///
/// The engine holds a dispatch table mapping each kind to one
/// implementation, so the methods here are kind-free.
///
/// # Safety Considerations
/// - `update` commits the whole field map in one call; backends must not
///   partially apply it.
/// - `upsert_fingerprint` may run concurrently for the same id; it is a
///   pure function of stored data, so last-write-wins is acceptable.
pub trait EntityRepository: Send + Sync {
    /// Get a stored entity by ID.
    fn get(&self, id: EntityId) -> Result<Option<EntityRecord>, RepositoryError>;

    /// Create a new entity from validated fields, returning its id.
    ///
    /// Backends with a configured natural key must reject a second create
    /// for the same key with [`RepositoryError::DuplicateKey`] so the
    /// create/create race resolves to a loud retry instead of a silent
    /// duplicate.
    fn create(&self, fields: FieldMap) -> Result<EntityId, RepositoryError>;

    /// Replace an entity's fields wholesale. Returns error if not found.
    fn update(&self, id: EntityId, fields: FieldMap) -> Result<(), RepositoryError>;

    /// Persist a computed fingerprint (idempotent, last-write-wins).
    ///
    /// A missing entity is a no-op: the value is derivable and the write
    /// may race with deletes.
    fn upsert_fingerprint(&self, id: EntityId, fingerprint: i64) -> Result<(), RepositoryError>;

    /// Fetch the bounded candidate window described by `window`.
    ///
    /// Returned order must be deterministic for identical storage state.
    fn candidate_window(
        &self,
        window: &CandidateWindow,
    ) -> Result<Vec<EntityRecord>, RepositoryError>;

    /// Find entities matching all the given field equality predicates.
    fn find(&self, equals: &[(String, FieldValue)]) -> Result<Vec<EntityRecord>, RepositoryError>;
}

/// Storage contract for proto records and their candidate sets.
pub trait ProtoStore: Send + Sync {
    /// Insert a new proto record. Returns error if the ID already exists.
    fn insert(&self, proto: ProtoRecord) -> Result<(), RepositoryError>;

    /// Get a proto record by ID.
    fn get(&self, id: ProtoId) -> Result<Option<ProtoRecord>, RepositoryError>;

    /// Update an existing proto record. Returns error if not found.
    fn update(&self, proto: ProtoRecord) -> Result<(), RepositoryError>;

    /// Find the proto record previously derived from `source` with the
    /// given data digest, if one exists (re-scan deduplication).
    fn find_for_source(
        &self,
        kind: &EntityKind,
        source: EntityId,
        digest: &str,
    ) -> Result<Option<ProtoRecord>, RepositoryError>;

    /// Replace a proto's candidate set in full.
    fn replace_candidates(
        &self,
        proto_id: ProtoId,
        candidates: Vec<Candidate>,
    ) -> Result<(), RepositoryError>;

    /// Delete a proto's candidate set.
    fn clear_candidates(&self, proto_id: ProtoId) -> Result<(), RepositoryError>;

    /// Read a proto's current candidate set, in stored (review) order.
    fn candidates(&self, proto_id: ProtoId) -> Result<Vec<Candidate>, RepositoryError>;
}

/// Storage contract for merge paths.
///
/// `redirect` must be atomic with respect to concurrent `resolve` calls: a
/// reader sees either the pre- or post-redirect state, never a partially
/// updated one.
pub trait MergePathStore: Send + Sync {
    /// Get or create the path whose origin is `origin`, initially pointing
    /// at `origin` itself.
    fn ensure(&self, kind: &EntityKind, origin: EntityId) -> Result<MergePath, RepositoryError>;

    /// Redirect every path currently pointing at `from` to point at `to`,
    /// in place and atomically. Returns the number of redirected paths.
    fn redirect(
        &self,
        kind: &EntityKind,
        from: EntityId,
        to: EntityId,
    ) -> Result<usize, RepositoryError>;

    /// Current resolution target for `origin`, if a path exists.
    fn resolve(
        &self,
        kind: &EntityKind,
        origin: EntityId,
    ) -> Result<Option<EntityId>, RepositoryError>;

    /// All paths currently pointing at `target`.
    fn pointing_at(
        &self,
        kind: &EntityKind,
        target: EntityId,
    ) -> Result<Vec<MergePath>, RepositoryError>;
}
