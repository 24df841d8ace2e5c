//! In-memory repository backends.
//!
//! Thread-safe reference implementations of the repository traits, intended
//! for embedded usage and tests. One [`InMemoryRepository`] serves one
//! entity kind's table, matching the engine's kind-to-repository dispatch.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::candidate::Candidate;
use crate::entity::{EntityId, EntityKind, EntityRecord};
use crate::field::{FieldMap, FieldValue};
use crate::merge::MergePath;
use crate::proto::{ProtoId, ProtoRecord};
use crate::repository::traits::{
    CandidateWindow, EntityRepository, MergePathStore, ProtoStore, RepositoryError,
};

fn lock_err(context: &'static str) -> RepositoryError {
    RepositoryError::Backend(format!("poisoned lock: {context}"))
}

fn matches_equals(fields: &FieldMap, equals: &[(String, FieldValue)]) -> bool {
    equals
        .iter()
        .all(|(name, value)| fields.get(name) == Some(value))
}

#[derive(Debug, Default)]
struct EntityState {
    by_id: HashMap<EntityId, EntityRecord>,
    natural_index: HashMap<String, EntityId>,
}

/// Thread-safe in-memory entity table for one kind.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    natural_key: Option<Vec<String>>,
    state: RwLock<EntityState>,
}

impl InMemoryRepository {
    /// Creates an empty table with no uniqueness constraint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table that enforces uniqueness over the given
    /// fields on create, turning the create/create race into a loud
    /// [`RepositoryError::DuplicateKey`].
    #[must_use]
    pub fn with_natural_key<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            natural_key: Some(fields.into_iter().map(Into::into).collect()),
            state: RwLock::new(EntityState::default()),
        }
    }

    /// Renders the natural key for a field map, if every key field is
    /// present and non-null. Incomplete keys are not enforced.
    fn natural_key_of(&self, fields: &FieldMap) -> Option<String> {
        let key_fields = self.natural_key.as_ref()?;
        let mut parts = Vec::with_capacity(key_fields.len());
        for name in key_fields {
            parts.push(fields.get(name)?.to_text()?);
        }
        Some(parts.join("\u{1f}"))
    }
}

impl EntityRepository for InMemoryRepository {
    fn get(&self, id: EntityId) -> Result<Option<EntityRecord>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("entity.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn create(&self, fields: FieldMap) -> Result<EntityId, RepositoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity.create"))?;

        let key = self.natural_key_of(&fields);
        if let Some(key) = &key {
            if state.natural_index.contains_key(key) {
                return Err(RepositoryError::DuplicateKey(key.replace('\u{1f}', "/")));
            }
        }

        let id = EntityId::new();
        if let Some(key) = key {
            state.natural_index.insert(key, id);
        }
        state.by_id.insert(id, EntityRecord::new(id, fields));
        Ok(id)
    }

    fn update(&self, id: EntityId, fields: FieldMap) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity.update"))?;
        let prev = state
            .by_id
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::EntityNotFound(id))?;

        let prev_key = self.natural_key_of(&prev.fields);
        let new_key = self.natural_key_of(&fields);
        if prev_key != new_key {
            if let Some(key) = &new_key {
                if let Some(holder) = state.natural_index.get(key) {
                    if *holder != id {
                        return Err(RepositoryError::DuplicateKey(key.replace('\u{1f}', "/")));
                    }
                }
            }
            if let Some(key) = prev_key {
                state.natural_index.remove(&key);
            }
            if let Some(key) = new_key {
                state.natural_index.insert(key, id);
            }
        }

        // The cached fingerprint is a pure function of the fields; a field
        // change invalidates it until the next backfill or realize pass.
        state.by_id.insert(
            id,
            EntityRecord {
                id,
                fields,
                fingerprint: None,
            },
        );
        Ok(())
    }

    fn upsert_fingerprint(&self, id: EntityId, fingerprint: i64) -> Result<(), RepositoryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("entity.upsert_fingerprint"))?;
        if let Some(record) = state.by_id.get_mut(&id) {
            record.fingerprint = Some(fingerprint);
        }
        Ok(())
    }

    fn candidate_window(
        &self,
        window: &CandidateWindow,
    ) -> Result<Vec<EntityRecord>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("entity.window"))?;

        let mut records: Vec<EntityRecord> = state
            .by_id
            .values()
            .filter(|record| Some(record.id) != window.exclude)
            .filter(|record| matches_equals(&record.fields, &window.equals))
            .filter(|record| match (window.band, record.fingerprint) {
                (None, _) => true,
                (Some(_), None) => window.include_unprofiled,
                (Some(band), Some(fp)) => {
                    let (low, high) = band.bounds();
                    low <= fp && fp <= high
                }
            })
            .cloned()
            .collect();

        // Deterministic order before the cap so repeated fetches against
        // unchanged state return the same window.
        records.sort_by_key(|r| r.id);
        records.truncate(window.cap);
        Ok(records)
    }

    fn find(&self, equals: &[(String, FieldValue)]) -> Result<Vec<EntityRecord>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("entity.find"))?;
        let mut records: Vec<EntityRecord> = state
            .by_id
            .values()
            .filter(|record| matches_equals(&record.fields, equals))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[derive(Debug, Default)]
struct ProtoState {
    by_id: HashMap<ProtoId, ProtoRecord>,
    candidates: HashMap<ProtoId, Vec<Candidate>>,
}

/// Thread-safe in-memory proto record store.
#[derive(Debug, Default)]
pub struct InMemoryProtoStore {
    state: RwLock<ProtoState>,
}

impl InMemoryProtoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProtoStore for InMemoryProtoStore {
    fn insert(&self, proto: ProtoRecord) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("proto.insert"))?;
        if state.by_id.contains_key(&proto.id) {
            return Err(RepositoryError::DuplicateKey(proto.id.to_string()));
        }
        state.by_id.insert(proto.id, proto);
        Ok(())
    }

    fn get(&self, id: ProtoId) -> Result<Option<ProtoRecord>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("proto.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn update(&self, proto: ProtoRecord) -> Result<(), RepositoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("proto.update"))?;
        if !state.by_id.contains_key(&proto.id) {
            return Err(RepositoryError::ProtoNotFound(proto.id));
        }
        state.by_id.insert(proto.id, proto);
        Ok(())
    }

    fn find_for_source(
        &self,
        kind: &EntityKind,
        source: EntityId,
        digest: &str,
    ) -> Result<Option<ProtoRecord>, RepositoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("proto.find_for_source"))?;
        let mut matches: Vec<&ProtoRecord> = state
            .by_id
            .values()
            .filter(|p| {
                p.kind == *kind
                    && p.source_entity_id == Some(source)
                    && p.data_digest() == digest
            })
            .collect();
        matches.sort_by_key(|p| p.id);
        Ok(matches.first().map(|p| (*p).clone()))
    }

    fn replace_candidates(
        &self,
        proto_id: ProtoId,
        candidates: Vec<Candidate>,
    ) -> Result<(), RepositoryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("proto.replace_candidates"))?;
        if !state.by_id.contains_key(&proto_id) {
            return Err(RepositoryError::ProtoNotFound(proto_id));
        }
        state.candidates.insert(proto_id, candidates);
        Ok(())
    }

    fn clear_candidates(&self, proto_id: ProtoId) -> Result<(), RepositoryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("proto.clear_candidates"))?;
        state.candidates.remove(&proto_id);
        Ok(())
    }

    fn candidates(&self, proto_id: ProtoId) -> Result<Vec<Candidate>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("proto.candidates"))?;
        Ok(state.candidates.get(&proto_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct MergePathState {
    by_origin: HashMap<(EntityKind, EntityId), MergePath>,
}

/// Thread-safe in-memory merge path store.
///
/// The redirect step runs under a single write lock, which is the narrow
/// critical section consolidation requires: concurrent readers observe
/// either the pre- or post-redirect state.
#[derive(Debug, Default)]
pub struct InMemoryMergePathStore {
    state: RwLock<MergePathState>,
}

impl InMemoryMergePathStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MergePathStore for InMemoryMergePathStore {
    fn ensure(&self, kind: &EntityKind, origin: EntityId) -> Result<MergePath, RepositoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("merge.ensure"))?;
        let path = state
            .by_origin
            .entry((kind.clone(), origin))
            .or_insert_with(|| MergePath::identity(kind.clone(), origin));
        Ok(path.clone())
    }

    fn redirect(
        &self,
        kind: &EntityKind,
        from: EntityId,
        to: EntityId,
    ) -> Result<usize, RepositoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("merge.redirect"))?;
        let mut redirected = 0;
        for ((path_kind, _), path) in state.by_origin.iter_mut() {
            if path_kind == kind && path.entity_id == from {
                path.redirect_to(to);
                redirected += 1;
            }
        }
        Ok(redirected)
    }

    fn resolve(
        &self,
        kind: &EntityKind,
        origin: EntityId,
    ) -> Result<Option<EntityId>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("merge.resolve"))?;
        Ok(state
            .by_origin
            .get(&(kind.clone(), origin))
            .map(|path| path.entity_id))
    }

    fn pointing_at(
        &self,
        kind: &EntityKind,
        target: EntityId,
    ) -> Result<Vec<MergePath>, RepositoryError> {
        let state = self.state.read().map_err(|_| lock_err("merge.pointing_at"))?;
        let mut paths: Vec<MergePath> = state
            .by_origin
            .values()
            .filter(|path| path.kind == *kind && path.entity_id == target)
            .cloned()
            .collect();
        paths.sort_by_key(|p| p.id);
        Ok(paths)
    }
}
