//! Key ranges.

use crate::error::{EngineError, EngineResult};
use shelf_codec::Key;
use std::ops::{Bound, RangeBounds};

/// A contiguous interval of keys.
///
/// Ranges are always well formed: the lower bound never exceeds the upper
/// one, so a range can be handed to `BTreeMap::range` directly. The default
/// range is unbounded on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// A range matching exactly `key`.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// All keys above `key` (or at it, unless `open`).
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(key.into()),
            lower_open: open,
            ..Self::default()
        }
    }

    /// All keys below `key` (or at it, unless `open`).
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            upper: Some(key.into()),
            upper_open: open,
            ..Self::default()
        }
    }

    /// All keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Data`] if `lower > upper`, or if they are equal
    /// and either side is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> EngineResult<Self> {
        let lower = lower.into();
        let upper = upper.into();
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(EngineError::data(format!(
                "empty key range: lower {lower} is not below upper {upper}"
            )));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// The lower key, if any.
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// The upper key, if any.
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower key is excluded.
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper key is excluded.
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Returns `true` if the range matches `key`.
    pub fn includes(&self, key: &Key) -> bool {
        !self.is_before_start(key) && !self.is_past_end(key)
    }

    /// Checks that both bounds are valid keys.
    pub(crate) fn validate(&self) -> EngineResult<()> {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .try_for_each(validate_key)
    }

    /// Returns `true` if `key` sorts below the range.
    pub(crate) fn is_before_start(&self, key: &Key) -> bool {
        match &self.lower {
            Some(lower) if self.lower_open => key <= lower,
            Some(lower) => key < lower,
            None => false,
        }
    }

    /// Returns `true` if `key` sorts above the range.
    pub(crate) fn is_past_end(&self, key: &Key) -> bool {
        match &self.upper {
            Some(upper) if self.upper_open => key >= upper,
            Some(upper) => key > upper,
            None => false,
        }
    }
}

impl RangeBounds<Key> for KeyRange {
    fn start_bound(&self) -> Bound<&Key> {
        match &self.lower {
            Some(key) if self.lower_open => Bound::Excluded(key),
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        }
    }

    fn end_bound(&self) -> Bound<&Key> {
        match &self.upper {
            Some(key) if self.upper_open => Bound::Excluded(key),
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        }
    }
}

/// Rejects keys that cannot be stored (NaN anywhere inside).
pub(crate) fn validate_key(key: &Key) -> EngineResult<()> {
    key.validate().map_err(|e| EngineError::data(e.to_string()))
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        Self::only(key)
    }
}
