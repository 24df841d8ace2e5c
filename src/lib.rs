//! # Protolink - entity resolution for loosely structured records
//!
//! Protolink decides whether an incoming, possibly-duplicate description of
//! a real-world entity already exists in a system of record. It links the
//! record automatically when confident, flags it for human review when
//! ambiguous, and can retroactively consolidate two entities previously
//! treated as distinct without breaking historical references.
//!
//! ## Core Concepts
//!
//! - **Proto record**: an unresolved candidate description awaiting identity
//!   resolution
//! - **Fingerprint**: a cheap, lossy numeric summary of a normalized string
//!   used to pre-filter candidates
//! - **Candidate**: a scored, provisional association between a proto record
//!   and an existing entity
//! - **Realize**: commit a proto record's data into a concrete entity
//! - **Merge path**: a durable redirect ensuring references to a since-merged
//!   entity resolve to its surviving counterpart
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use protolink::normalize::NormalizerPipeline;
//! use protolink::{
//!     field_map, DiscoveryParams, EntityKind, FieldValue, InMemoryRepository, KindProfile,
//!     ResolutionEngine,
//! };
//!
//! let repo = Arc::new(InMemoryRepository::new());
//! let profile = KindProfile::new(
//!     EntityKind::new("home"),
//!     NormalizerPipeline::new("street")
//!         .transliterate()
//!         .lowercase()
//!         .collapse_whitespace()
//!         .replace_tokens([("street", "st"), ("avenue", "ave")]),
//! )
//! .fingerprint_threshold(400)
//! .levenshtein_threshold(6);
//!
//! let engine = ResolutionEngine::builder().kind(profile, repo).build();
//!
//! let proto_id = engine.submit(
//!     EntityKind::new("home"),
//!     field_map([("street", FieldValue::from("123 Main Street"))]),
//! )?;
//! let _report = engine.discover(proto_id, &DiscoveryParams::default())?;
//! let entity_id = engine.realize(proto_id)?;
//! assert!(entity_id.is_some());
//! # Ok::<(), protolink::EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod candidate;
pub mod entity;
pub mod error;
pub mod field;
pub mod proto;

// Matching primitives
pub mod fingerprint;
pub mod matcher;
pub mod normalize;

// Plugins, storage, and orchestration
pub mod discover;
pub mod engine;
pub mod merge;
pub mod realize;
pub mod registry;
pub mod repository;

// Re-export primary types at crate root for convenience
pub use candidate::Candidate;
pub use discover::{Discovery, DiscoveryOutcome, DiscoveryParams};
pub use engine::{DiscoveryReport, EngineBuilder, ImportOutcome, ResolutionEngine};
pub use entity::{EntityId, EntityKind, EntityRecord, EntityRef};
pub use error::{EngineError, EngineResult, FieldError, NormalizeError, ValidationError};
pub use field::{field_map, FieldMap, FieldValue};
pub use fingerprint::FingerprintWindow;
pub use merge::{ConsolidateReport, MergePath, MergePathId};
pub use proto::{ProtoFailure, ProtoId, ProtoRecord, ResolutionState};
pub use realize::Realization;
pub use registry::{KindProfile, OverlayValidator, ProfileRegistry, Validator};
pub use repository::{
    CandidateWindow, EntityRepository, InMemoryMergePathStore, InMemoryProtoStore,
    InMemoryRepository, MergePathStore, ProtoStore, RepositoryError,
};
