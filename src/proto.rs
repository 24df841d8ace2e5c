//! Proto records: the unit of resolution work.
//!
//! A proto record is an unresolved, possibly-duplicate description of a
//! real-world entity awaiting identity resolution. It is created when new
//! data arrives, mutated by discovery (fingerprint, state), by selection
//! (human or auto), and by realization (failure slot). A resubmission
//! supersedes the record with a fresh one rather than editing it in place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityId, EntityKind};
use crate::field::FieldMap;

/// Globally unique proto record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtoId(Uuid);

impl ProtoId {
    /// Creates a new random proto ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a proto ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProtoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProtoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a proto record sits in the discovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    /// Discovery has not run since the record was created.
    Unresolved,
    /// Exactly one confident match was found and selected automatically.
    AutoMatched,
    /// One imperfect or several plausible matches; awaiting explicit selection.
    Ambiguous,
    /// No candidate survived; the caller may create a new entity.
    NoMatch,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::AutoMatched => write!(f, "auto_matched"),
            Self::Ambiguous => write!(f, "ambiguous"),
            Self::NoMatch => write!(f, "no_match"),
        }
    }
}

/// Structured realization failure recorded on a proto record.
///
/// Failures live on the record instead of crossing the API boundary so
/// batch callers can keep processing their remaining records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoFailure {
    /// Human-readable failure message.
    pub message: String,
    /// Optional trace or field-level detail.
    pub trace: Option<String>,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

/// An unresolved candidate description of a real-world entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtoRecord {
    /// Unique identifier for this unit of work.
    pub id: ProtoId,

    /// Which domain type this record targets; selects the plugin profile.
    pub kind: EntityKind,

    /// Raw field values, exactly as received.
    pub raw_fields: FieldMap,

    /// Cached fingerprint of the normalized value.
    ///
    /// Recomputed by every discovery run; `None` before the first run.
    pub fingerprint: Option<i64>,

    /// The entity this record resolves to, once a decision is made.
    pub selected_entity_id: Option<EntityId>,

    /// The existing entity this record was derived from, if any.
    ///
    /// Set when re-scanning a stored entity so discovery can exclude it
    /// from its own candidate window.
    pub source_entity_id: Option<EntityId>,

    /// Discovery state machine position.
    pub state: ResolutionState,

    /// Last realization failure, if any.
    pub error: Option<ProtoFailure>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProtoRecord {
    /// Creates a fresh proto record for incoming data.
    #[must_use]
    pub fn new(kind: EntityKind, raw_fields: FieldMap) -> Self {
        let now = Utc::now();
        Self {
            id: ProtoId::new(),
            kind,
            raw_fields,
            fingerprint: None,
            selected_entity_id: None,
            source_entity_id: None,
            state: ResolutionState::Unresolved,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a proto record that represents an existing stored entity.
    ///
    /// Discovery will exclude `source` from the candidate window so the
    /// record cannot match itself during a re-scan.
    #[must_use]
    pub fn for_entity(kind: EntityKind, raw_fields: FieldMap, source: EntityId) -> Self {
        let mut proto = Self::new(kind, raw_fields);
        proto.source_entity_id = Some(source);
        proto
    }

    /// Stable identity of the raw payload.
    ///
    /// Blake3 over the canonical JSON encoding of `raw_fields` (field order
    /// is deterministic). Two submissions of the same snapshot digest
    /// identically, which is what re-submission deduplication keys on.
    #[must_use]
    pub fn data_digest(&self) -> String {
        let canonical = serde_json::to_string(&self.raw_fields)
            .expect("field maps always encode to JSON");
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }

    /// Records a decision: resolve to `entity_id`, or explicitly none.
    pub fn select(&mut self, entity_id: Option<EntityId>) {
        self.selected_entity_id = entity_id;
        self.touch();
    }

    /// Records a realization failure.
    pub fn assign_failure(&mut self, message: impl Into<String>, trace: Option<String>) {
        self.error = Some(ProtoFailure {
            message: message.into(),
            trace,
            at: Utc::now(),
        });
        self.touch();
    }

    /// Clears any transient realization failure.
    pub fn clear_failure(&mut self) {
        if self.error.is_some() {
            self.error = None;
            self.touch();
        }
    }

    /// True once a decision has been recorded.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.selected_entity_id.is_some()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
