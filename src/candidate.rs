//! Scored candidate associations.
//!
//! A candidate links one proto record to one existing entity, scored by the
//! edit distance between their normalized values and by the fingerprint
//! delta. Both scores are derived by discovery and never independently
//! settable; the candidate set for a proto is fully replaced on every
//! discovery run, so stale candidates cannot survive a re-run.

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::proto::ProtoId;

/// A scored, provisional association between a proto record and an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// The proto record this candidate belongs to.
    pub proto_id: ProtoId,

    /// The existing entity being proposed.
    pub entity_id: EntityId,

    /// Levenshtein distance between the two normalized values.
    pub edit_distance: u32,

    /// Candidate fingerprint minus proto fingerprint.
    pub fingerprint_delta: i64,
}

impl Candidate {
    /// Creates a scored candidate.
    #[must_use]
    pub const fn new(
        proto_id: ProtoId,
        entity_id: EntityId,
        edit_distance: u32,
        fingerprint_delta: i64,
    ) -> Self {
        Self {
            proto_id,
            entity_id,
            edit_distance,
            fingerprint_delta,
        }
    }

    /// True for a perfect (distance zero) match.
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        self.edit_distance == 0
    }
}

/// Sorts candidates into the review order.
///
/// Ascending edit distance; ties broken by smaller absolute fingerprint
/// delta, then by entity id. The order is total and deterministic so that
/// repeated discovery runs against unchanged data produce the same top-N.
pub fn sort_for_review(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.edit_distance
            .cmp(&b.edit_distance)
            .then_with(|| a.fingerprint_delta.abs().cmp(&b.fingerprint_delta.abs()))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
}
