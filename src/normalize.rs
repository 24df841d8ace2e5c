//! Normalizer pipelines.
//!
//! A pipeline reduces a record's raw fields to a single comparable string:
//! extract the profiled field, transliterate non-ASCII noise, lowercase,
//! and replace known abbreviation/synonym tokens with word-boundary-safe
//! substitution. Every step is pure and deterministic, so identical inputs
//! always normalize identically; that property is what makes cached
//! fingerprints and repeated discovery runs trustworthy.
//!
//! Pipelines are supplied per entity kind by the plugin profile. Token
//! tables are domain data (postal suffixes, compass directions, legal
//! suffixes) and stay with the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::NormalizeError;
use crate::field::{FieldMap, FieldValue};

/// Word-boundary-safe token substitution table.
///
/// Compiled once at profile registration; replaces whole tokens only, so a
/// table mapping `street -> st` leaves "streetcar" alone.
#[derive(Debug, Clone)]
pub struct TokenReplacer {
    pattern: Regex,
    lookup: HashMap<String, String>,
}

impl TokenReplacer {
    /// Builds a replacer from `(token, replacement)` pairs.
    ///
    /// Returns `None` for an empty table. Longer tokens win over their own
    /// prefixes because the alternation is ordered longest-first.
    #[must_use]
    pub fn new<I, K, V>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let lookup: HashMap<String, String> =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if lookup.is_empty() {
            return None;
        }

        let mut tokens: Vec<&String> = lookup.keys().collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
        let pattern = Regex::new(&format!(r"\b({})\b", alternation.join("|")))
            .expect("escaped token alternation is always a valid pattern");

        Some(Self { pattern, lookup })
    }

    /// Applies the table to `input`.
    #[must_use]
    pub fn apply(&self, input: &str) -> String {
        self.pattern
            .replace_all(input, |caps: &regex::Captures<'_>| {
                self.lookup[&caps[1]].clone()
            })
            .into_owned()
    }
}

/// One pure transformation in a normalizer pipeline.
#[derive(Clone)]
pub enum NormalizeStep {
    /// NFKC compatibility fold, then drop combining marks (accents).
    Transliterate,
    /// ASCII-aware lowercasing of the whole value.
    Lowercase,
    /// Trim and collapse internal whitespace runs to single spaces.
    CollapseWhitespace,
    /// Word-boundary-safe token substitution.
    Replace(TokenReplacer),
    /// Caller-supplied pure transform.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl NormalizeStep {
    fn apply(&self, input: &str) -> String {
        match self {
            Self::Transliterate => {
                let folded: String = input.nfkc().collect();
                folded
                    .chars()
                    .nfd()
                    .filter(|c| !is_combining_mark(*c))
                    .collect()
            }
            Self::Lowercase => input.to_lowercase(),
            Self::CollapseWhitespace => {
                input.split_whitespace().collect::<Vec<_>>().join(" ")
            }
            Self::Replace(replacer) => replacer.apply(input),
            Self::Custom(f) => f(input),
        }
    }
}

impl fmt::Debug for NormalizeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transliterate => write!(f, "Transliterate"),
            Self::Lowercase => write!(f, "Lowercase"),
            Self::CollapseWhitespace => write!(f, "CollapseWhitespace"),
            Self::Replace(_) => write!(f, "Replace(..)"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Ordered, pure normalization pipeline for one entity kind.
///
/// # Examples
///
/// ```
/// use protolink::normalize::NormalizerPipeline;
/// use protolink::{field_map, FieldValue};
///
/// let pipeline = NormalizerPipeline::new("street")
///     .transliterate()
///     .lowercase()
///     .collapse_whitespace()
///     .replace_tokens([("street", "st"), ("avenue", "ave")]);
///
/// let fields = field_map([("street", FieldValue::from("123  Main Street"))]);
/// assert_eq!(pipeline.normalize(&fields).unwrap(), "123 main st");
/// ```
#[derive(Debug, Clone)]
pub struct NormalizerPipeline {
    source_field: String,
    steps: Vec<NormalizeStep>,
}

impl NormalizerPipeline {
    /// Creates an empty pipeline extracting `source_field`.
    #[must_use]
    pub fn new(source_field: impl Into<String>) -> Self {
        Self {
            source_field: source_field.into(),
            steps: Vec::new(),
        }
    }

    /// The field the pipeline extracts from raw data.
    #[must_use]
    pub fn source_field(&self) -> &str {
        &self.source_field
    }

    /// Appends a transliteration step.
    #[must_use]
    pub fn transliterate(mut self) -> Self {
        self.steps.push(NormalizeStep::Transliterate);
        self
    }

    /// Appends a lowercasing step.
    #[must_use]
    pub fn lowercase(mut self) -> Self {
        self.steps.push(NormalizeStep::Lowercase);
        self
    }

    /// Appends a whitespace-collapsing step.
    #[must_use]
    pub fn collapse_whitespace(mut self) -> Self {
        self.steps.push(NormalizeStep::CollapseWhitespace);
        self
    }

    /// Appends a token-substitution step. An empty table is a no-op.
    #[must_use]
    pub fn replace_tokens<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Some(replacer) = TokenReplacer::new(pairs) {
            self.steps.push(NormalizeStep::Replace(replacer));
        }
        self
    }

    /// Appends a caller-supplied pure transform.
    #[must_use]
    pub fn custom(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.steps.push(NormalizeStep::Custom(Arc::new(f)));
        self
    }

    /// Normalizes a record's raw fields to a comparable string.
    ///
    /// # Errors
    ///
    /// `NormalizeError::MissingField` when the source field is absent or
    /// null; the engine never guesses at missing data.
    pub fn normalize(&self, fields: &FieldMap) -> Result<String, NormalizeError> {
        let raw = fields
            .get(&self.source_field)
            .and_then(FieldValue::to_text)
            .ok_or_else(|| NormalizeError::MissingField {
                field: self.source_field.clone(),
            })?;

        let mut value = raw;
        for step in &self.steps {
            value = step.apply(&value);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::field_map;

    fn street_pipeline() -> NormalizerPipeline {
        NormalizerPipeline::new("street")
            .transliterate()
            .lowercase()
            .collapse_whitespace()
            .replace_tokens([
                ("street", "st"),
                ("str", "st"),
                ("avenue", "ave"),
                ("north", "n"),
            ])
    }

    #[test]
    fn test_abbreviation_expansion_unifies_variants() {
        let pipeline = street_pipeline();
        let a = field_map([("street", FieldValue::from("123 Main Street"))]);
        let b = field_map([("street", FieldValue::from("123 Main St"))]);
        assert_eq!(
            pipeline.normalize(&a).unwrap(),
            pipeline.normalize(&b).unwrap()
        );
    }

    #[test]
    fn test_word_boundary_safety() {
        let pipeline = street_pipeline();
        let fields = field_map([("street", FieldValue::from("1 Streetcar Row"))]);
        // "street" must not fire inside "streetcar".
        assert_eq!(pipeline.normalize(&fields).unwrap(), "1 streetcar row");
    }

    #[test]
    fn test_longest_token_wins() {
        let pipeline = NormalizerPipeline::new("street")
            .lowercase()
            .replace_tokens([("north", "n"), ("northwest", "nw")]);
        let fields = field_map([("street", FieldValue::from("10 Northwest Blvd"))]);
        assert_eq!(pipeline.normalize(&fields).unwrap(), "10 nw blvd");
    }

    #[test]
    fn test_transliteration_strips_accents() {
        let pipeline = NormalizerPipeline::new("name").transliterate().lowercase();
        let fields = field_map([("name", FieldValue::from("Café Montréal"))]);
        assert_eq!(pipeline.normalize(&fields).unwrap(), "cafe montreal");
    }

    #[test]
    fn test_collapse_whitespace() {
        let pipeline = NormalizerPipeline::new("street").collapse_whitespace();
        let fields = field_map([("street", FieldValue::from("  12   Elm  St "))]);
        assert_eq!(pipeline.normalize(&fields).unwrap(), "12 Elm St");
    }

    #[test]
    fn test_missing_field_is_typed_error() {
        let pipeline = street_pipeline();
        let fields = field_map([("city", FieldValue::from("Phoenix"))]);
        assert_eq!(
            pipeline.normalize(&fields),
            Err(NormalizeError::MissingField {
                field: "street".to_string()
            })
        );
    }

    #[test]
    fn test_null_field_is_missing() {
        let pipeline = street_pipeline();
        let fields = field_map([("street", FieldValue::Null)]);
        assert!(pipeline.normalize(&fields).is_err());
    }

    #[test]
    fn test_numeric_field_renders_as_text() {
        let pipeline = NormalizerPipeline::new("unit").lowercase();
        let fields = field_map([("unit", FieldValue::from(42i64))]);
        assert_eq!(pipeline.normalize(&fields).unwrap(), "42");
    }

    #[test]
    fn test_determinism() {
        let pipeline = street_pipeline();
        let fields = field_map([("street", FieldValue::from("123 North Main Street"))]);
        let first = pipeline.normalize(&fields).unwrap();
        for _ in 0..10 {
            assert_eq!(pipeline.normalize(&fields).unwrap(), first);
        }
    }

    #[test]
    fn test_custom_step() {
        let pipeline = NormalizerPipeline::new("street")
            .lowercase()
            .custom(|s| s.replace('#', "unit "));
        let fields = field_map([("street", FieldValue::from("9 Oak #4"))]);
        assert_eq!(pipeline.normalize(&fields).unwrap(), "9 oak unit 4");
    }
}
