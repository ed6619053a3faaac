//! Character-count cap on extracted text.
//!
//! Runs on decoded text before any markup is added, so `max_length` bounds the
//! raw extracted text. Cuts fall on extended grapheme cluster boundaries: a
//! base character is never separated from its combining marks.

use unicode_segmentation::UnicodeSegmentation;

/// Caps text at a maximum number of characters (Unicode scalar values).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Truncator {
    max_length: Option<usize>,
}

impl Truncator {
    /// Create a truncator; `None` disables truncation
    #[inline]
    #[must_use = "creates a truncator"]
    pub const fn new(max_length: Option<usize>) -> Self {
        Self { max_length }
    }

    /// Configured ceiling
    #[inline]
    #[must_use = "returns the configured ceiling"]
    pub const fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Byte index at which `text` must be cut, or `None` if it already fits.
    #[must_use = "returns the cut position"]
    pub fn cut_index(&self, text: &str) -> Option<usize> {
        let max = self.max_length?;
        // Byte length bounds character count from above.
        if text.len() <= max {
            return None;
        }

        let mut chars = 0usize;
        for (idx, grapheme) in text.grapheme_indices(true) {
            chars += grapheme.chars().count();
            if chars > max {
                return Some(idx);
            }
        }
        None
    }

    /// Truncate `text` in place. Returns `true` if anything was removed.
    pub fn apply(&self, text: &mut String) -> bool {
        match self.cut_index(text) {
            Some(idx) => {
                text.truncate(idx);
                true
            }
            None => false,
        }
    }
}
