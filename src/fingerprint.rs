//! Cheap numeric fingerprints for normalized strings.
//!
//! Think of the fingerprint like a hash, except it changes only by
//! predictable amounts when the source string changes. Comparing two
//! fingerprints does not tell you what is different, only roughly how much.
//! That makes it queryable: a large entity table can be culled to a small
//! candidate window before paying for edit-distance comparisons. It is not a
//! collision-resistant hash and is always paired with an exact or
//! edit-distance confirmation step.

use serde::{Deserialize, Serialize};

/// Computes the fingerprint of a normalized string.
///
/// Sum of the character code points. Two normalized strings that are a few
/// edits apart usually, not always, land within a small delta of each other.
///
/// # Examples
///
/// ```
/// use protolink::fingerprint::fingerprint;
///
/// assert_eq!(fingerprint(""), 0);
/// assert_eq!(fingerprint("ab"), i64::from('a' as u32) + i64::from('b' as u32));
/// ```
#[must_use]
pub fn fingerprint(normalized: &str) -> i64 {
    normalized.chars().map(|c| i64::from(c as u32)).sum()
}

/// A threshold band around a fingerprint value.
///
/// The in-pass membership check is exclusive on both ends; the repository
/// pre-filter uses the inclusive [`bounds`](Self::bounds) since the
/// pre-filter only has to produce a superset of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintWindow {
    /// The fingerprint the band is centered on.
    pub center: i64,
    /// Half-width of the band.
    pub threshold: i64,
}

impl FingerprintWindow {
    /// Creates a window centered on `center` with half-width `threshold`.
    #[must_use]
    pub const fn new(center: i64, threshold: i64) -> Self {
        Self { center, threshold }
    }

    /// Strict membership check: `center - threshold < value < center + threshold`.
    #[must_use]
    pub const fn contains(&self, value: i64) -> bool {
        self.center - self.threshold < value && value < self.center + self.threshold
    }

    /// Inclusive `[low, high]` bounds for repository range filters.
    #[must_use]
    pub const fn bounds(&self) -> (i64, i64) {
        (self.center - self.threshold, self.center + self.threshold)
    }
}
