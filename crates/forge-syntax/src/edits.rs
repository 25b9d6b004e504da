//! Byte-range text edits
//!
//! Passes collect edits against the original text and apply them once,
//! so byte offsets taken from a tree stay valid while edits accumulate.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// Ordered set of replacements against one source text
#[derive(Debug, Clone, Default)]
pub struct TextEdits {
    edits: Vec<Edit>,
}

impl TextEdits {
    /// Create empty edit set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { edits: Vec::new() }
    }

    /// Replace `range` with `text`
    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push(Edit {
            start: range.start,
            end: range.end,
            replacement: text.into(),
        });
    }

    /// Insert `text` at byte offset `at`
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at..at, text);
    }

    /// Number of pending edits
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Whether no edits are pending
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all edits to `source`.
    ///
    /// Edits overlapping an earlier one, or falling outside the text or off a
    /// char boundary, are dropped rather than corrupting the output.
    #[must_use]
    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|e| (e.start, e.end));

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for edit in self.edits {
            if edit.start < cursor || edit.start > edit.end {
                continue;
            }
            let (Some(kept), Some(_)) = (source.get(cursor..edit.start), source.get(edit.start..edit.end))
            else {
                continue;
            };
            out.push_str(kept);
            out.push_str(&edit.replacement);
            cursor = edit.end;
        }
        out.push_str(source.get(cursor..).unwrap_or(""));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_in_offset_order() {
        let mut edits = TextEdits::new();
        edits.replace(6..11, "forge");
        edits.replace(0..5, "HELLO");
        assert_eq!(edits.apply("hello world"), "HELLO forge");
    }

    #[test]
    fn insert_before_replace_at_same_offset() {
        let mut edits = TextEdits::new();
        edits.replace(0..1, "b");
        edits.insert(0, "<");
        assert_eq!(edits.apply("a"), "<b");
    }

    #[test]
    fn overlapping_edit_is_dropped() {
        let mut edits = TextEdits::new();
        edits.replace(0..4, "x");
        edits.replace(2..6, "y");
        assert_eq!(edits.apply("abcdefg"), "xefg");
    }

    #[test]
    fn out_of_range_edit_is_dropped() {
        let mut edits = TextEdits::new();
        edits.replace(10..20, "nope");
        assert_eq!(edits.apply("short"), "short");
    }

    #[test]
    fn empty_set_is_identity() {
        assert!(TextEdits::new().is_empty());
        assert_eq!(TextEdits::new().apply("same"), "same");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_edits_never_panic(
                source in "\\PC{0,40}",
                ranges in proptest::collection::vec((0usize..64, 0usize..64, "[a-z]{0,4}"), 0..8),
            ) {
                let mut edits = TextEdits::new();
                for (a, b, text) in ranges {
                    edits.replace(a.min(b)..a.max(b), text);
                }
                let _ = edits.apply(&source);
            }

            #[test]
            fn single_replace_splices(source in "[a-z ]{1,40}", at in 0usize..40, text in "[A-Z]{0,6}") {
                let at = at.min(source.len());
                let mut edits = TextEdits::new();
                edits.replace(at..source.len(), text.clone());
                prop_assert_eq!(edits.apply(&source), format!("{}{}", &source[..at], text));
            }
        }
    }
}
