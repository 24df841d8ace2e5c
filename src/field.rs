//! Raw field values carried by proto records.
//!
//! Incoming records are loosely structured: an ordered mapping of field
//! names to strings, numbers, or nulls, kept exactly as received. The
//! engine never interprets fields beyond what the kind profile tells it to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered mapping of field name to raw value, exactly as received.
///
/// A `BTreeMap` keeps iteration (and therefore the canonical JSON encoding
/// used for data digests) deterministic.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single raw field value.
///
/// # Examples
///
/// ```
/// use protolink::FieldValue;
///
/// let street = FieldValue::from("123 Main St");
/// assert!(street.is_text());
/// assert_eq!(street.as_text(), Some("123 Main St"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl FieldValue {
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Renders the value as text for normalization.
    ///
    /// Returns `None` for nulls so callers can distinguish "absent" from
    /// "present but empty".
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Text(v) => Some(v.clone()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Null => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// Builds a [`FieldMap`] from `(name, value)` pairs.
///
/// # Examples
///
/// ```
/// use protolink::{field_map, FieldValue};
///
/// let fields = field_map([("street", FieldValue::from("456 Oak Ave"))]);
/// assert_eq!(fields.len(), 1);
/// ```
pub fn field_map<I, K>(pairs: I) -> FieldMap
where
    I: IntoIterator<Item = (K, FieldValue)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
