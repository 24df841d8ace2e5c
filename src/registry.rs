//! Per-kind plugin profiles and the startup registry.
//!
//! The engine is domain-agnostic: everything domain-specific — which field
//! to normalize, how to normalize it, the matching thresholds, extra
//! candidate predicates, and commit validation — arrives through a
//! [`KindProfile`]. Profiles are registered once at startup and resolved
//! by entity kind at call time; there is no runtime composition.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::EntityKind;
use crate::error::ValidationError;
use crate::field::{FieldMap, FieldValue};
use crate::normalize::NormalizerPipeline;
use crate::proto::ProtoRecord;

/// Default bound on the candidate set presented for review.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

/// Default hard cap on the fetched candidate window.
pub const DEFAULT_WINDOW_CAP: usize = 1000;

/// Domain validation and field application for the realizer.
///
/// Given the currently stored fields (or `None` on the create path) and the
/// proto's raw fields, returns the complete post-commit field map, or a
/// validation error. The engine commits the returned map in one repository
/// call, so an implementation that returns `Ok` has vouched for the whole
/// update.
pub trait Validator: Send + Sync {
    /// Validates `incoming` against `existing` and produces the full field
    /// map to commit.
    fn validate_and_apply(
        &self,
        existing: Option<&FieldMap>,
        incoming: &FieldMap,
    ) -> Result<FieldMap, ValidationError>;
}

/// Default validator: overlay incoming fields on the stored ones, accept
/// everything. Domains with real rules supply their own implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlayValidator;

impl Validator for OverlayValidator {
    fn validate_and_apply(
        &self,
        existing: Option<&FieldMap>,
        incoming: &FieldMap,
    ) -> Result<FieldMap, ValidationError> {
        let mut fields = existing.cloned().unwrap_or_default();
        for (name, value) in incoming {
            fields.insert(name.clone(), value.clone());
        }
        Ok(fields)
    }
}

type ExtraPredicateFn = Arc<dyn Fn(&ProtoRecord) -> Vec<(String, FieldValue)> + Send + Sync>;

/// Everything the engine needs to know about one entity kind.
///
/// # Examples
///
/// ```
/// use protolink::normalize::NormalizerPipeline;
/// use protolink::{EntityKind, KindProfile};
///
/// let profile = KindProfile::new(
///     EntityKind::new("home"),
///     NormalizerPipeline::new("street").lowercase(),
/// )
/// .fingerprint_threshold(400)
/// .levenshtein_threshold(6)
/// .candidate_limit(10);
///
/// assert_eq!(profile.candidate_limit_value(), 10);
/// ```
#[derive(Clone)]
pub struct KindProfile {
    kind: EntityKind,
    pipeline: NormalizerPipeline,
    fingerprint_threshold: i64,
    levenshtein_threshold: u32,
    candidate_limit: usize,
    window_cap: usize,
    extra_predicates: Option<ExtraPredicateFn>,
    validator: Arc<dyn Validator>,
}

impl KindProfile {
    /// Creates a profile with default thresholds (exact matching only).
    #[must_use]
    pub fn new(kind: EntityKind, pipeline: NormalizerPipeline) -> Self {
        Self {
            kind,
            pipeline,
            fingerprint_threshold: 0,
            levenshtein_threshold: 0,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            window_cap: DEFAULT_WINDOW_CAP,
            extra_predicates: None,
            validator: Arc::new(OverlayValidator),
        }
    }

    /// Sets the fingerprint band half-width for the pre-filter.
    #[must_use]
    pub fn fingerprint_threshold(mut self, threshold: i64) -> Self {
        self.fingerprint_threshold = threshold;
        self
    }

    /// Sets the maximum edit distance a candidate may have.
    #[must_use]
    pub fn levenshtein_threshold(mut self, threshold: u32) -> Self {
        self.levenshtein_threshold = threshold;
        self
    }

    /// Sets the maximum number of candidates kept for review.
    #[must_use]
    pub fn candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Sets the hard cap on the fetched candidate window.
    #[must_use]
    pub fn window_cap(mut self, cap: usize) -> Self {
        self.window_cap = cap;
        self
    }

    /// Supplies extra equality predicates derived from the proto record
    /// (for example, restricting candidates to the same city).
    #[must_use]
    pub fn extra_predicates(
        mut self,
        f: impl Fn(&ProtoRecord) -> Vec<(String, FieldValue)> + Send + Sync + 'static,
    ) -> Self {
        self.extra_predicates = Some(Arc::new(f));
        self
    }

    /// Supplies the domain validator for realization.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// The kind this profile serves.
    #[must_use]
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// The normalizer pipeline for this kind.
    #[must_use]
    pub fn pipeline(&self) -> &NormalizerPipeline {
        &self.pipeline
    }

    /// Fingerprint band half-width.
    #[must_use]
    pub const fn fingerprint_threshold_value(&self) -> i64 {
        self.fingerprint_threshold
    }

    /// Maximum candidate edit distance.
    #[must_use]
    pub const fn levenshtein_threshold_value(&self) -> u32 {
        self.levenshtein_threshold
    }

    /// Maximum candidates kept for review.
    #[must_use]
    pub const fn candidate_limit_value(&self) -> usize {
        self.candidate_limit
    }

    /// Hard cap on the fetched window.
    #[must_use]
    pub const fn window_cap_value(&self) -> usize {
        self.window_cap
    }

    /// Evaluates the extra predicates for a proto record.
    #[must_use]
    pub fn predicates_for(&self, proto: &ProtoRecord) -> Vec<(String, FieldValue)> {
        match &self.extra_predicates {
            Some(f) => f(proto),
            None => Vec::new(),
        }
    }

    /// The domain validator.
    #[must_use]
    pub fn validator_ref(&self) -> &dyn Validator {
        self.validator.as_ref()
    }
}

impl fmt::Debug for KindProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindProfile")
            .field("kind", &self.kind)
            .field("pipeline", &self.pipeline)
            .field("fingerprint_threshold", &self.fingerprint_threshold)
            .field("levenshtein_threshold", &self.levenshtein_threshold)
            .field("candidate_limit", &self.candidate_limit)
            .field("window_cap", &self.window_cap)
            .finish_non_exhaustive()
    }
}

/// Registry of kind profiles, resolved at startup.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<EntityKind, Arc<KindProfile>>,
}

impl ProfileRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile, replacing any previous one for the same kind.
    pub fn register(&mut self, profile: KindProfile) {
        self.profiles
            .insert(profile.kind().clone(), Arc::new(profile));
    }

    /// Looks up the profile for a kind.
    #[must_use]
    pub fn get(&self, kind: &EntityKind) -> Option<Arc<KindProfile>> {
        self.profiles.get(kind).cloned()
    }

    /// All registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.profiles.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
