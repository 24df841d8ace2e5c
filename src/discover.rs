//! Discovery orchestration: the decision state machine.
//!
//! One discovery run takes a proto record from `Unresolved` to exactly one
//! of `AutoMatched`, `Ambiguous`, or `NoMatch`. The run is cheap-first: a
//! fingerprint band culls the entity table to a bounded window, an exact
//! comparison resolves the common case, and Levenshtein scoring confirms or
//! rejects the remainder. Runs are safe back to back: the caller clears the
//! prior candidate set before each run and persists the returned set as a
//! full replacement, so nothing stale survives.

use tracing::debug;

use crate::candidate::{sort_for_review, Candidate};
use crate::entity::EntityId;
use crate::error::EngineResult;
use crate::fingerprint::{fingerprint, FingerprintWindow};
use crate::matcher::levenshtein;
use crate::proto::{ProtoRecord, ResolutionState};
use crate::registry::KindProfile;
use crate::repository::{CandidateWindow, EntityRepository};

/// Optional per-call overrides of the profile's tuning knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryParams {
    /// Overrides the profile's fingerprint band half-width.
    pub fingerprint_threshold: Option<i64>,
    /// Overrides the profile's maximum candidate edit distance.
    pub levenshtein_threshold: Option<u32>,
    /// Overrides the profile's candidate limit.
    pub candidate_limit: Option<usize>,
}

/// Terminal decision of one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Exactly one confident match; it has been selected on the proto.
    AutoMatched {
        /// The matched entity.
        entity_id: EntityId,
    },
    /// One imperfect or several plausible matches await explicit selection.
    Ambiguous,
    /// Nothing survived; the caller may create a new entity.
    NoMatch,
}

impl Discovery {
    /// The resolution state this decision corresponds to.
    #[must_use]
    pub const fn state(&self) -> ResolutionState {
        match self {
            Self::AutoMatched { .. } => ResolutionState::AutoMatched,
            Self::Ambiguous => ResolutionState::Ambiguous,
            Self::NoMatch => ResolutionState::NoMatch,
        }
    }
}

/// Result of one discovery run: the decision plus the candidate set that
/// must replace the proto's previous one in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// The decision reached.
    pub decision: Discovery,
    /// The complete new candidate set, already in review order.
    pub candidates: Vec<Candidate>,
}

/// Runs the decision policy for one proto record.
///
/// Mutates the proto in place: the fingerprint cache is always refreshed,
/// the state always lands on the returned decision, and an auto-match also
/// records the selection. Candidate persistence is left to the caller so
/// the full-replacement invariant lives in one place.
///
/// # Errors
///
/// Normalization failure of the *proto* (missing source field) is fatal to
/// the call; candidates that cannot be normalized are skipped. Repository
/// failures propagate and leave the call safely retryable.
pub fn discover(
    proto: &mut ProtoRecord,
    profile: &KindProfile,
    repo: &dyn EntityRepository,
    params: &DiscoveryParams,
) -> EngineResult<DiscoveryOutcome> {
    let fingerprint_threshold = params
        .fingerprint_threshold
        .unwrap_or_else(|| profile.fingerprint_threshold_value());
    let levenshtein_threshold = params
        .levenshtein_threshold
        .unwrap_or_else(|| profile.levenshtein_threshold_value());
    let candidate_limit = params
        .candidate_limit
        .unwrap_or_else(|| profile.candidate_limit_value());

    let normalized = profile.pipeline().normalize(&proto.raw_fields)?;
    let proto_fp = fingerprint(&normalized);
    proto.fingerprint = Some(proto_fp);
    proto.touch();

    // An empty normalized value would sit within any positive band of
    // everything; it can never identify an entity.
    if normalized.is_empty() {
        proto.state = ResolutionState::NoMatch;
        return Ok(DiscoveryOutcome {
            decision: Discovery::NoMatch,
            candidates: Vec::new(),
        });
    }

    let band = FingerprintWindow::new(proto_fp, fingerprint_threshold);
    let window = CandidateWindow::banded(band, profile.window_cap_value())
        .excluding(proto.source_entity_id)
        .with_equals(profile.predicates_for(proto));
    let records = repo.candidate_window(&window)?;
    debug!(
        proto = %proto.id,
        fingerprint = proto_fp,
        window = records.len(),
        "scanning candidate window"
    );

    // Fast path: among cached-fingerprint hits, an exact normalized-value
    // comparison. Fingerprint collisions are expected; equality of the
    // strings is what decides.
    let mut exact: Vec<EntityId> = Vec::new();
    for record in records.iter().filter(|r| r.fingerprint == Some(proto_fp)) {
        match profile.pipeline().normalize(&record.fields) {
            Ok(candidate_normalized) if candidate_normalized == normalized => {
                exact.push(record.id);
            }
            Ok(_) => {}
            Err(err) => {
                debug!(entity = %record.id, %err, "skipping candidate that cannot be normalized");
            }
        }
    }
    if exact.len() == 1 {
        let entity_id = exact[0];
        let candidate = Candidate::new(proto.id, entity_id, 0, 0);
        proto.select(Some(entity_id));
        proto.state = ResolutionState::AutoMatched;
        debug!(proto = %proto.id, %entity_id, "exact match auto-selected");
        return Ok(DiscoveryOutcome {
            decision: Discovery::AutoMatched { entity_id },
            candidates: vec![candidate],
        });
    }

    // Fallback: score the whole window by edit distance, backfilling
    // fingerprints that were never cached.
    let mut survivors: Vec<Candidate> = Vec::new();
    for record in &records {
        let candidate_normalized = match profile.pipeline().normalize(&record.fields) {
            Ok(value) => value,
            Err(err) => {
                debug!(entity = %record.id, %err, "skipping candidate that cannot be normalized");
                continue;
            }
        };

        let candidate_fp = match record.fingerprint {
            Some(fp) => fp,
            None => {
                let fp = fingerprint(&candidate_normalized);
                repo.upsert_fingerprint(record.id, fp)?;
                fp
            }
        };

        if !band.contains(candidate_fp) {
            continue;
        }

        let distance = levenshtein(&candidate_normalized, &normalized);
        if distance <= levenshtein_threshold {
            survivors.push(Candidate::new(
                proto.id,
                record.id,
                distance,
                candidate_fp - proto_fp,
            ));
        }
    }

    if survivors.is_empty() {
        proto.state = ResolutionState::NoMatch;
        return Ok(DiscoveryOutcome {
            decision: Discovery::NoMatch,
            candidates: Vec::new(),
        });
    }

    // A sole perfect survivor is still an auto-match; this is where an
    // absent cached fingerprint lands after backfilling.
    if survivors.len() == 1 && survivors[0].is_exact() {
        let candidate = survivors.pop().expect("len checked above");
        let entity_id = candidate.entity_id;
        proto.select(Some(entity_id));
        proto.state = ResolutionState::AutoMatched;
        debug!(proto = %proto.id, %entity_id, "sole perfect survivor auto-selected");
        return Ok(DiscoveryOutcome {
            decision: Discovery::AutoMatched { entity_id },
            candidates: vec![candidate],
        });
    }

    sort_for_review(&mut survivors);
    survivors.truncate(candidate_limit);
    proto.state = ResolutionState::Ambiguous;
    debug!(
        proto = %proto.id,
        candidates = survivors.len(),
        "ambiguous; awaiting selection"
    );
    Ok(DiscoveryOutcome {
        decision: Discovery::Ambiguous,
        candidates: survivors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::field::{field_map, FieldValue};
    use crate::normalize::NormalizerPipeline;
    use crate::repository::InMemoryRepository;

    fn street_profile() -> KindProfile {
        KindProfile::new(
            EntityKind::new("home"),
            NormalizerPipeline::new("street")
                .transliterate()
                .lowercase()
                .collapse_whitespace()
                .replace_tokens([("street", "st"), ("str", "st"), ("avenue", "ave")]),
        )
        .fingerprint_threshold(400)
        .levenshtein_threshold(6)
    }

    fn proto(street: &str) -> ProtoRecord {
        ProtoRecord::new(
            EntityKind::new("home"),
            field_map([("street", FieldValue::from(street))]),
        )
    }

    fn seed(repo: &InMemoryRepository, profile: &KindProfile, street: &str) -> EntityId {
        let fields = field_map([("street", FieldValue::from(street))]);
        let id = repo.create(fields.clone()).unwrap();
        let normalized = profile.pipeline().normalize(&fields).unwrap();
        repo.upsert_fingerprint(id, fingerprint(&normalized)).unwrap();
        id
    }

    #[test]
    fn test_exact_match_auto_selects() {
        let repo = InMemoryRepository::new();
        let profile = street_profile();
        let existing = seed(&repo, &profile, "123 main street");

        let mut proto = proto("123 Main St");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();

        assert_eq!(
            outcome.decision,
            Discovery::AutoMatched {
                entity_id: existing
            }
        );
        assert_eq!(outcome.candidates.len(), 1);
        assert!(outcome.candidates[0].is_exact());
        assert_eq!(proto.selected_entity_id, Some(existing));
        assert_eq!(proto.state, ResolutionState::AutoMatched);
    }

    #[test]
    fn test_no_match_when_window_is_empty() {
        let repo = InMemoryRepository::new();
        let profile = street_profile();
        seed(&repo, &profile, "999 Faraway Blvd");

        let mut proto = proto("456 Oak Ave");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();

        assert_eq!(outcome.decision, Discovery::NoMatch);
        assert!(outcome.candidates.is_empty());
        assert!(proto.selected_entity_id.is_none());
        assert_eq!(proto.state, ResolutionState::NoMatch);
    }

    #[test]
    fn test_two_close_entities_are_ambiguous() {
        // No token table here: with one, "100 Elm Str" would normalize to
        // "100 elm st" and the fast path would fire instead.
        let repo = InMemoryRepository::new();
        let profile = KindProfile::new(
            EntityKind::new("home"),
            NormalizerPipeline::new("street").lowercase(),
        )
        .fingerprint_threshold(400)
        .levenshtein_threshold(6);
        // Neither entity has a cached fingerprint, so the fast path cannot
        // see the perfect match and both land in the fallback scoring pass.
        let exact = repo
            .create(field_map([("street", FieldValue::from("100 Elm St"))]))
            .unwrap();
        let typo = repo
            .create(field_map([("street", FieldValue::from("100 Elm Str"))]))
            .unwrap();

        let mut proto = proto("100 Elm St");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();

        assert_eq!(outcome.decision, Discovery::Ambiguous);
        let scored: Vec<(EntityId, u32)> = outcome
            .candidates
            .iter()
            .map(|c| (c.entity_id, c.edit_distance))
            .collect();
        assert_eq!(scored, vec![(exact, 0), (typo, 1)]);
        assert!(proto.selected_entity_id.is_none());
        assert_eq!(proto.state, ResolutionState::Ambiguous);
    }

    #[test]
    fn test_empty_normalized_value_short_circuits() {
        let repo = InMemoryRepository::new();
        let profile = street_profile();
        seed(&repo, &profile, ""); // even an empty stored value must not match

        let mut proto = proto("");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();

        assert_eq!(outcome.decision, Discovery::NoMatch);
        assert!(outcome.candidates.is_empty());
        assert_eq!(proto.fingerprint, Some(0));
    }

    #[test]
    fn test_backfill_recovers_missing_fingerprint() {
        let repo = InMemoryRepository::new();
        let profile = street_profile();
        // Stored without a cached fingerprint: the fast path cannot see it.
        let fields = field_map([("street", FieldValue::from("123 main st"))]);
        let existing = repo.create(fields).unwrap();

        let mut proto = proto("123 Main Street");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();

        assert_eq!(
            outcome.decision,
            Discovery::AutoMatched {
                entity_id: existing
            }
        );
        // The pass also persisted the fingerprint for next time.
        let cached = repo.get(existing).unwrap().unwrap().fingerprint;
        assert!(cached.is_some());
    }

    #[test]
    fn test_source_entity_is_excluded() {
        let repo = InMemoryRepository::new();
        let profile = street_profile();
        let existing = seed(&repo, &profile, "123 main st");

        let mut proto = ProtoRecord::for_entity(
            EntityKind::new("home"),
            field_map([("street", FieldValue::from("123 Main St"))]),
            existing,
        );
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();
        assert_eq!(outcome.decision, Discovery::NoMatch);
    }

    #[test]
    fn test_candidate_limit_bounds_output() {
        let repo = InMemoryRepository::new();
        let profile = KindProfile::new(
            EntityKind::new("home"),
            NormalizerPipeline::new("street").lowercase(),
        )
        .fingerprint_threshold(2000)
        .levenshtein_threshold(10)
        .candidate_limit(3);

        for i in 0..8 {
            seed(&repo, &profile, &format!("10{i} elm st"));
        }

        // "100 elm sq" matches nothing exactly, so all eight stay in play.
        let mut proto = proto("100 elm sq");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();
        assert_eq!(outcome.decision, Discovery::Ambiguous);
        assert_eq!(outcome.candidates.len(), 3);
    }

    #[test]
    fn test_no_false_positives_beyond_threshold() {
        let repo = InMemoryRepository::new();
        let profile = KindProfile::new(
            EntityKind::new("home"),
            NormalizerPipeline::new("street").lowercase(),
        )
        .fingerprint_threshold(5000)
        .levenshtein_threshold(2);
        let far = seed(&repo, &profile, "wholly unrelated text");

        let mut proto = proto("100 elm st");
        let outcome = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap();
        assert!(outcome
            .candidates
            .iter()
            .all(|c| c.entity_id != far));
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let repo = InMemoryRepository::new();
        let profile = KindProfile::new(
            EntityKind::new("home"),
            NormalizerPipeline::new("street").lowercase(),
        )
        .fingerprint_threshold(2000)
        .levenshtein_threshold(10);
        for street in ["100 elm st", "100 elm str", "101 elm st"] {
            seed(&repo, &profile, street);
        }

        // Close to all three, identical to none: the ambiguous ordering is
        // what must be reproducible.
        let mut first_proto = proto("100 elm sq");
        let first =
            discover(&mut first_proto, &profile, &repo, &DiscoveryParams::default()).unwrap();
        let mut second_proto = proto("100 elm sq");
        let second =
            discover(&mut second_proto, &profile, &repo, &DiscoveryParams::default()).unwrap();

        assert_eq!(first.decision, second.decision);
        let order = |o: &DiscoveryOutcome| {
            o.candidates
                .iter()
                .map(|c| (c.entity_id, c.edit_distance, c.fingerprint_delta))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn test_params_override_profile() {
        let repo = InMemoryRepository::new();
        let profile = KindProfile::new(
            EntityKind::new("home"),
            NormalizerPipeline::new("street").lowercase(),
        )
        .fingerprint_threshold(2000)
        .levenshtein_threshold(10);
        seed(&repo, &profile, "100 elm str");

        let params = DiscoveryParams {
            levenshtein_threshold: Some(0),
            ..DiscoveryParams::default()
        };
        let mut proto = proto("100 elm st");
        let outcome = discover(&mut proto, &profile, &repo, &params).unwrap();
        assert_eq!(outcome.decision, Discovery::NoMatch);
    }

    #[test]
    fn test_missing_proto_field_is_fatal() {
        let repo = InMemoryRepository::new();
        let profile = street_profile();
        let mut proto = ProtoRecord::new(
            EntityKind::new("home"),
            field_map([("city", FieldValue::from("phoenix"))]),
        );
        let err = discover(&mut proto, &profile, &repo, &DiscoveryParams::default()).unwrap_err();
        assert!(err.is_normalize());
    }
}
