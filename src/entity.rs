//! Entity identity types.
//!
//! Entities are owned by the calling domain; the engine only ever refers to
//! them through opaque identifiers tagged with an entity kind. Stable ids are
//! the prerequisite for everything else: candidates, selections, and merge
//! paths all anchor to them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::FieldMap;

/// Globally unique, stable entity identifier.
///
/// Once created, an `EntityId` never changes. Merge paths redirect around
/// retired ids; the ids themselves are immutable.
///
/// # Examples
///
/// ```
/// use protolink::EntityId;
///
/// let id = EntityId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil entity ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Tag identifying which domain type a record targets.
///
/// Opaque to the engine: kinds select the plugin profile and the repository
/// in the engine's dispatch table, nothing more.
///
/// # Examples
///
/// ```
/// use protolink::EntityKind;
///
/// let kind = EntityKind::new("home");
/// assert_eq!(kind.as_str(), "home");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    /// Creates a kind tag from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the kind name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Tagged reference to an entity in a heterogeneous table space.
///
/// Replaces raw polymorphic (kind, id) pointers with a typed pair; the
/// engine's dispatch table maps the kind to a repository implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Which domain type the id belongs to.
    pub kind: EntityKind,
    /// The entity's opaque identifier.
    pub id: EntityId,
}

impl EntityRef {
    /// Creates a tagged reference.
    #[must_use]
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The engine's view of a stored entity.
///
/// Repositories return records in this shape; the engine reads fields to
/// normalize and score candidates, and writes fields only through the
/// realizer's validated commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The entity's identifier.
    pub id: EntityId,

    /// The stored field values, as the repository last committed them.
    pub fields: FieldMap,

    /// Cached fingerprint of the entity's normalized value.
    ///
    /// `None` until lazily backfilled by a discovery pass; always a pure
    /// function of `fields` once present.
    pub fingerprint: Option<i64>,
}

impl EntityRecord {
    /// Creates a record with no cached fingerprint.
    #[must_use]
    pub fn new(id: EntityId, fields: FieldMap) -> Self {
        Self {
            id,
            fields,
            fingerprint: None,
        }
    }
}
