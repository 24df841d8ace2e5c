//! The resolution engine facade.
//!
//! [`ResolutionEngine`] is the explicitly constructed context that ties the
//! pluggable pieces together: a profile registry, a dispatch table mapping
//! each entity kind to its repository, a proto store, and a merge path
//! store. Its lifetime is scoped by the caller; there is no process-wide
//! mutable state. All methods are call-scoped units of work, safe to run
//! in parallel across unrelated records.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::candidate::Candidate;
use crate::discover::{discover, DiscoveryParams};
use crate::entity::{EntityId, EntityKind};
use crate::error::{EngineError, EngineResult};
use crate::field::FieldMap;
use crate::merge::{consolidate, resolve_entity, ConsolidateReport};
use crate::proto::{ProtoId, ProtoRecord, ResolutionState};
use crate::realize::{realize, Realization};
use crate::registry::{KindProfile, ProfileRegistry};
use crate::repository::{
    EntityRepository, InMemoryMergePathStore, InMemoryProtoStore, MergePathStore, ProtoStore,
    RepositoryError,
};

/// What one discovery run reported for a proto record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// The proto record the run operated on.
    pub proto_id: ProtoId,
    /// Terminal state of the run.
    pub state: ResolutionState,
    /// The selection, populated on auto-match.
    pub selected_entity_id: Option<EntityId>,
    /// The complete candidate set, in review order.
    pub candidates: Vec<Candidate>,
}

/// Outcome of a combined discover-then-realize import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The record was resolved and committed to this entity.
    Realized(EntityId),
    /// Discovery was ambiguous; the candidates await an explicit selection.
    AwaitingSelection(Vec<Candidate>),
    /// Realization failed domain validation; the failure is recorded on
    /// the proto record.
    Failed,
}

/// Builder for [`ResolutionEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    registry: ProfileRegistry,
    repositories: HashMap<EntityKind, Arc<dyn EntityRepository>>,
    protos: Option<Arc<dyn ProtoStore>>,
    merge_paths: Option<Arc<dyn MergePathStore>>,
}

impl EngineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind: its profile and the repository serving its table.
    #[must_use]
    pub fn kind(mut self, profile: KindProfile, repository: Arc<dyn EntityRepository>) -> Self {
        self.repositories.insert(profile.kind().clone(), repository);
        self.registry.register(profile);
        self
    }

    /// Supplies a proto store (defaults to the in-memory one).
    #[must_use]
    pub fn proto_store(mut self, store: Arc<dyn ProtoStore>) -> Self {
        self.protos = Some(store);
        self
    }

    /// Supplies a merge path store (defaults to the in-memory one).
    #[must_use]
    pub fn merge_path_store(mut self, store: Arc<dyn MergePathStore>) -> Self {
        self.merge_paths = Some(store);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> ResolutionEngine {
        ResolutionEngine {
            registry: self.registry,
            repositories: self.repositories,
            protos: self
                .protos
                .unwrap_or_else(|| Arc::new(InMemoryProtoStore::new())),
            merge_paths: self
                .merge_paths
                .unwrap_or_else(|| Arc::new(InMemoryMergePathStore::new())),
        }
    }
}

/// The entity-resolution engine.
pub struct ResolutionEngine {
    registry: ProfileRegistry,
    repositories: HashMap<EntityKind, Arc<dyn EntityRepository>>,
    protos: Arc<dyn ProtoStore>,
    merge_paths: Arc<dyn MergePathStore>,
}

impl ResolutionEngine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn profile_for(&self, kind: &EntityKind) -> EngineResult<Arc<KindProfile>> {
        self.registry
            .get(kind)
            .ok_or_else(|| EngineError::UnknownKind { kind: kind.clone() })
    }

    fn repository_for(&self, kind: &EntityKind) -> EngineResult<Arc<dyn EntityRepository>> {
        self.repositories
            .get(kind)
            .cloned()
            .ok_or_else(|| EngineError::UnknownKind { kind: kind.clone() })
    }

    fn load_proto(&self, proto_id: ProtoId) -> EngineResult<ProtoRecord> {
        self.protos
            .get(proto_id)?
            .ok_or_else(|| RepositoryError::ProtoNotFound(proto_id).into())
    }

    /// Accepts a new unit of work, returning its proto id.
    pub fn submit(&self, kind: EntityKind, raw_fields: FieldMap) -> EngineResult<ProtoId> {
        self.profile_for(&kind)?;
        let proto = ProtoRecord::new(kind, raw_fields);
        let proto_id = proto.id;
        self.protos.insert(proto)?;
        debug!(proto = %proto_id, "accepted proto record");
        Ok(proto_id)
    }

    /// Reverse-engineers a proto record from an existing stored entity.
    ///
    /// Used to re-scan an entity against the rest of its table (the record
    /// excludes its own source from discovery). Submitting the same entity
    /// snapshot twice returns the previously created record.
    pub fn proto_for_entity(&self, kind: EntityKind, entity_id: EntityId) -> EngineResult<ProtoId> {
        let repo = self.repository_for(&kind)?;
        let record = repo
            .get(entity_id)?
            .ok_or(RepositoryError::EntityNotFound(entity_id))?;

        let proto = ProtoRecord::for_entity(kind.clone(), record.fields, entity_id);
        let digest = proto.data_digest();
        if let Some(existing) = self.protos.find_for_source(&kind, entity_id, &digest)? {
            return Ok(existing.id);
        }
        let proto_id = proto.id;
        self.protos.insert(proto)?;
        Ok(proto_id)
    }

    /// Runs discovery for a proto record.
    ///
    /// Prior candidates are cleared before any other work, so an
    /// interrupted or failed run never leaves a stale set behind and the
    /// whole call is safe to retry.
    pub fn discover(
        &self,
        proto_id: ProtoId,
        params: &DiscoveryParams,
    ) -> EngineResult<DiscoveryReport> {
        let mut proto = self.load_proto(proto_id)?;
        let profile = self.profile_for(&proto.kind)?;
        let repo = self.repository_for(&proto.kind)?;

        self.protos.clear_candidates(proto_id)?;
        let outcome = discover(&mut proto, &profile, repo.as_ref(), params)?;
        self.protos
            .replace_candidates(proto_id, outcome.candidates.clone())?;
        self.protos.update(proto.clone())?;

        Ok(DiscoveryReport {
            proto_id,
            state: proto.state,
            selected_entity_id: proto.selected_entity_id,
            candidates: outcome.candidates,
        })
    }

    /// Records an explicit selection (or explicit "create new" with `None`).
    pub fn select(&self, proto_id: ProtoId, entity_id: Option<EntityId>) -> EngineResult<()> {
        let mut proto = self.load_proto(proto_id)?;
        proto.select(entity_id);
        self.protos.update(proto)?;
        Ok(())
    }

    /// Commits a proto record's data to its selected entity, or to a new
    /// entity when nothing is selected.
    ///
    /// Returns `Ok(Some(entity_id))` on success and `Ok(None)` when domain
    /// validation rejected the data — the failure is then readable from the
    /// proto record. Repository failures propagate.
    pub fn realize(&self, proto_id: ProtoId) -> EngineResult<Option<EntityId>> {
        let mut proto = self.load_proto(proto_id)?;
        let profile = self.profile_for(&proto.kind)?;
        let repo = self.repository_for(&proto.kind)?;

        let outcome = realize(&mut proto, &profile, repo.as_ref())?;
        self.protos.update(proto)?;
        Ok(match outcome {
            Realization::Committed(entity_id) => Some(entity_id),
            Realization::Invalid => None,
        })
    }

    /// Takes a proto record as far as it can go in one call: discover,
    /// then realize unless the outcome is ambiguous.
    ///
    /// Safe to call back to back on the same record whether or not the
    /// previous attempt worked. A record that is already resolved skips
    /// straight to realization.
    pub fn import(
        &self,
        proto_id: ProtoId,
        params: &DiscoveryParams,
    ) -> EngineResult<ImportOutcome> {
        let proto = self.load_proto(proto_id)?;

        if proto.selected_entity_id.is_none() {
            let report = self.discover(proto_id, params)?;
            if report.state == ResolutionState::Ambiguous {
                return Ok(ImportOutcome::AwaitingSelection(report.candidates));
            }
        }

        Ok(match self.realize(proto_id)? {
            Some(entity_id) => ImportOutcome::Realized(entity_id),
            None => ImportOutcome::Failed,
        })
    }

    /// Reads a proto record.
    pub fn proto(&self, proto_id: ProtoId) -> EngineResult<ProtoRecord> {
        self.load_proto(proto_id)
    }

    /// Reads a proto record's current candidate set, in review order.
    pub fn candidates(&self, proto_id: ProtoId) -> EngineResult<Vec<Candidate>> {
        self.load_proto(proto_id)?;
        Ok(self.protos.candidates(proto_id)?)
    }

    /// Folds `duplicate` into `master` for the given kind.
    ///
    /// Future lookups through any previously-known path resolve to the
    /// master; migrating the duplicate's dependent data stays with the
    /// caller.
    pub fn consolidate(
        &self,
        kind: &EntityKind,
        master: EntityId,
        duplicate: EntityId,
    ) -> EngineResult<ConsolidateReport> {
        self.profile_for(kind)?;
        consolidate(self.merge_paths.as_ref(), kind, master, duplicate)
    }

    /// Resolves an entity id through the merge path map.
    pub fn resolve_entity(&self, kind: &EntityKind, id: EntityId) -> EngineResult<EntityId> {
        resolve_entity(self.merge_paths.as_ref(), kind, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{field_map, FieldValue};
    use crate::fingerprint::fingerprint;
    use crate::normalize::NormalizerPipeline;
    use crate::repository::InMemoryRepository;

    fn kind() -> EntityKind {
        EntityKind::new("home")
    }

    fn engine_with_repo() -> (ResolutionEngine, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let profile = KindProfile::new(
            kind(),
            NormalizerPipeline::new("street")
                .lowercase()
                .replace_tokens([("street", "st")]),
        )
        .fingerprint_threshold(400)
        .levenshtein_threshold(6);
        let engine = ResolutionEngine::builder()
            .kind(profile, repo.clone())
            .build();
        (engine, repo)
    }

    fn seed(engine: &ResolutionEngine, repo: &InMemoryRepository, street: &str) -> EntityId {
        let fields = field_map([("street", FieldValue::from(street))]);
        let id = repo.create(fields).unwrap();
        let profile = engine.profile_for(&kind()).unwrap();
        let normalized = profile
            .pipeline()
            .normalize(&repo.get(id).unwrap().unwrap().fields)
            .unwrap();
        repo.upsert_fingerprint(id, fingerprint(&normalized))
            .unwrap();
        id
    }

    fn fields(street: &str) -> FieldMap {
        field_map([("street", FieldValue::from(street))])
    }

    #[test]
    fn test_submit_requires_known_kind() {
        let (engine, _) = engine_with_repo();
        let err = engine
            .submit(EntityKind::new("company"), fields("x"))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownKind { .. }));
    }

    #[test]
    fn test_submit_discover_automatch_realize() {
        let (engine, repo) = engine_with_repo();
        let existing = seed(&engine, &repo, "123 main st");

        let proto_id = engine.submit(kind(), fields("123 Main Street")).unwrap();
        let report = engine
            .discover(proto_id, &DiscoveryParams::default())
            .unwrap();
        assert_eq!(report.state, ResolutionState::AutoMatched);
        assert_eq!(report.selected_entity_id, Some(existing));

        let entity_id = engine.realize(proto_id).unwrap();
        assert_eq!(entity_id, Some(existing));
    }

    #[test]
    fn test_no_match_then_create() {
        let (engine, repo) = engine_with_repo();
        let proto_id = engine.submit(kind(), fields("456 Oak Ave")).unwrap();

        let report = engine
            .discover(proto_id, &DiscoveryParams::default())
            .unwrap();
        assert_eq!(report.state, ResolutionState::NoMatch);
        assert!(report.candidates.is_empty());

        let entity_id = engine.realize(proto_id).unwrap().expect("created");
        assert!(repo.get(entity_id).unwrap().is_some());
        assert_eq!(
            engine.proto(proto_id).unwrap().selected_entity_id,
            Some(entity_id)
        );
    }

    #[test]
    fn test_select_then_realize() {
        let (engine, repo) = engine_with_repo();
        let a = seed(&engine, &repo, "100 elm st");
        let _b = seed(&engine, &repo, "100 elm str");

        let proto_id = engine.submit(kind(), fields("100 elm sq")).unwrap();
        let report = engine
            .discover(proto_id, &DiscoveryParams::default())
            .unwrap();
        assert_eq!(report.state, ResolutionState::Ambiguous);

        engine.select(proto_id, Some(a)).unwrap();
        assert_eq!(engine.realize(proto_id).unwrap(), Some(a));
    }

    #[test]
    fn test_import_realizes_no_match_as_create() {
        let (engine, _) = engine_with_repo();
        let proto_id = engine.submit(kind(), fields("456 Oak Ave")).unwrap();

        let outcome = engine
            .import(proto_id, &DiscoveryParams::default())
            .unwrap();
        assert!(matches!(outcome, ImportOutcome::Realized(_)));
    }

    #[test]
    fn test_import_surfaces_ambiguity() {
        let (engine, repo) = engine_with_repo();
        seed(&engine, &repo, "100 elm st");
        seed(&engine, &repo, "100 elm str");

        let proto_id = engine.submit(kind(), fields("100 elm sq")).unwrap();
        let outcome = engine
            .import(proto_id, &DiscoveryParams::default())
            .unwrap();
        let ImportOutcome::AwaitingSelection(candidates) = outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(candidates.len(), 2);

        // No error was recorded: ambiguity is a state, not a failure.
        assert!(engine.proto(proto_id).unwrap().error.is_none());
    }

    #[test]
    fn test_import_skips_discovery_when_resolved() {
        let (engine, repo) = engine_with_repo();
        let existing = seed(&engine, &repo, "123 main st");

        let proto_id = engine.submit(kind(), fields("123 Main Street")).unwrap();
        engine.select(proto_id, Some(existing)).unwrap();

        let outcome = engine
            .import(proto_id, &DiscoveryParams::default())
            .unwrap();
        assert_eq!(outcome, ImportOutcome::Realized(existing));
    }

    #[test]
    fn test_proto_for_entity_deduplicates() {
        let (engine, repo) = engine_with_repo();
        let existing = seed(&engine, &repo, "123 main st");

        let first = engine.proto_for_entity(kind(), existing).unwrap();
        let second = engine.proto_for_entity(kind(), existing).unwrap();
        assert_eq!(first, second);

        let proto = engine.proto(first).unwrap();
        assert_eq!(proto.source_entity_id, Some(existing));
    }

    #[test]
    fn test_consolidate_and_resolve() {
        let (engine, repo) = engine_with_repo();
        let master = seed(&engine, &repo, "123 main st");
        let duplicate = seed(&engine, &repo, "123 main street apt 2");

        let report = engine.consolidate(&kind(), master, duplicate).unwrap();
        assert_eq!(report.redirected, 1);
        assert_eq!(engine.resolve_entity(&kind(), duplicate).unwrap(), master);
        assert_eq!(engine.resolve_entity(&kind(), master).unwrap(), master);
    }

    #[test]
    fn test_rediscovery_replaces_candidates() {
        let (engine, repo) = engine_with_repo();
        seed(&engine, &repo, "100 elm st");
        seed(&engine, &repo, "100 elm str");

        let proto_id = engine.submit(kind(), fields("100 elm sq")).unwrap();
        let first = engine
            .discover(proto_id, &DiscoveryParams::default())
            .unwrap();
        assert_eq!(first.candidates.len(), 2);

        // Tighten the threshold: the re-run must fully replace the set.
        let params = DiscoveryParams {
            levenshtein_threshold: Some(0),
            ..DiscoveryParams::default()
        };
        let second = engine.discover(proto_id, &params).unwrap();
        assert_eq!(second.state, ResolutionState::NoMatch);
        assert!(second.candidates.is_empty());
        assert!(engine.candidates(proto_id).unwrap().is_empty());
    }
}
