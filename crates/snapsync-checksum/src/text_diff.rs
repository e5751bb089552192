//! Positional text diffs
//!
//! Provides [`TextDiff`], an ordered list of non-overlapping
//! `(old byte span, replacement)` pairs, and [`TextDelta`], the diff of one
//! document tagged with the checksum of the text it applies to.
//!
//! Diffing is character-level Myers with a wall-clock timeout, so an
//! unrelated rewrite of a large document costs at most [`DiffBudget::timeout`].

use crate::checksum::Checksum;
use crate::ids::DocumentId;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag};
use std::ops::Range;
use std::time::{Duration, Instant};

/// Unchanged runs shorter than this between two changes are folded into one change
const MIN_ANCHOR_LEN: usize = 8;

/// A diff keeping less than `1 / FULL_REPLACEMENT_RATIO` of the old text replaces it
const FULL_REPLACEMENT_RATIO: usize = 8;

/// Limits on diffing one pair of texts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffBudget {
    /// Texts longer than this many bytes are not diffed at all
    pub max_len: usize,
    /// Wall-clock time the diff may take
    pub timeout: Duration,
}

impl Default for DiffBudget {
    fn default() -> Self {
        Self {
            max_len: 256 * 1024,
            timeout: Duration::from_millis(50),
        }
    }
}

/// Replace the bytes of `span` in the old text with `new_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    /// Byte range in the old text
    pub span: Range<usize>,
    /// Replacement text
    pub new_text: String,
}

impl TextChange {
    /// Create a change
    #[inline]
    #[must_use]
    pub fn new(span: Range<usize>, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }

    /// Pure insertion at `offset`
    #[inline]
    #[must_use]
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset..offset, text)
    }
}

/// Ordered, non-overlapping changes turning one text into another
///
/// # Invariants
/// - spans are sorted by start and never overlap
/// - every span lies on `char` boundaries of the old text
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TextDiff {
    changes: Vec<TextChange>,
}

impl TextDiff {
    /// Character-level diff between `old` and `new`
    ///
    /// Adjacent deletions and insertions are coalesced into one change, as
    /// are changes separated by only a few unchanged bytes. Past the default
    /// [`DiffBudget::timeout`] the remaining region is emitted as one coarse
    /// change; the result always reproduces `new`.
    #[must_use]
    pub fn compute(old: &str, new: &str) -> Self {
        Self::diff(old, new, DiffBudget::default().timeout)
    }

    /// Diff `old` against `new` unless that exceeds `budget`
    ///
    /// Returns `None` when either text is longer than [`DiffBudget::max_len`]
    /// or the diff ran out of time. Callers treat both as a wholesale rewrite.
    #[must_use]
    pub fn compute_within(old: &str, new: &str, budget: &DiffBudget) -> Option<Self> {
        if old.len().max(new.len()) > budget.max_len {
            return None;
        }
        let started = Instant::now();
        let diff = Self::diff(old, new, budget.timeout);
        (started.elapsed() < budget.timeout).then_some(diff)
    }

    fn diff(old: &str, new: &str, timeout: Duration) -> Self {
        if old == new {
            return Self::default();
        }
        let diff = similar::TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .timeout(timeout)
            .diff_chars(old, new);

        let mut changes = Vec::new();
        let mut pending: Option<TextChange> = None;
        let mut offset = 0usize;
        for change in diff.iter_all_changes() {
            let value = change.value();
            match change.tag() {
                ChangeTag::Equal => {
                    changes.extend(pending.take());
                    offset += value.len();
                }
                ChangeTag::Delete => {
                    pending
                        .get_or_insert_with(|| TextChange::insert(offset, String::new()))
                        .span
                        .end += value.len();
                    offset += value.len();
                }
                ChangeTag::Insert => {
                    pending
                        .get_or_insert_with(|| TextChange::insert(offset, String::new()))
                        .new_text
                        .push_str(value);
                }
            }
        }
        changes.extend(pending);
        Self {
            changes: absorb_short_anchors(old, changes),
        }
    }

    /// Build from received changes, checking ordering
    ///
    /// # Errors
    /// [`TextDeltaError::ReversedSpan`] when a span ends before it starts,
    /// [`TextDeltaError::Overlapping`] when spans are unsorted or overlap
    pub fn from_changes(changes: Vec<TextChange>) -> Result<Self, TextDeltaError> {
        let mut previous_end = 0;
        for (index, change) in changes.iter().enumerate() {
            let span = &change.span;
            if span.start > span.end {
                return Err(TextDeltaError::ReversedSpan {
                    index,
                    start: span.start,
                    end: span.end,
                });
            }
            if index > 0 && span.start < previous_end {
                return Err(TextDeltaError::Overlapping { index });
            }
            previous_end = span.end;
        }
        Ok(Self { changes })
    }

    /// The changes, in order
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &[TextChange] {
        &self.changes
    }

    /// Number of changes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// No change at all
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether the diff rewrites a non-empty `old` text rather than editing it
    ///
    /// True when less than an eighth of `old` survives unchanged, which
    /// includes the single span covering all of `old`. Filling an empty text
    /// is not a full replacement: the insertion is the whole edit and worth
    /// sending.
    #[must_use]
    pub fn is_full_replacement(&self, old: &str) -> bool {
        if old.is_empty() || self.changes.is_empty() {
            return false;
        }
        let replaced: usize = self.changes.iter().map(|c| c.span.len()).sum();
        let kept = old.len().saturating_sub(replaced);
        kept * FULL_REPLACEMENT_RATIO < old.len()
    }

    /// Apply to `old`, producing the new text
    ///
    /// # Errors
    /// Returns [`TextDeltaError::SpanOutOfBounds`] if a span does not fit `old`
    /// or does not fall on character boundaries
    pub fn apply(&self, old: &str) -> Result<String, TextDeltaError> {
        let mut out = String::with_capacity(old.len());
        let mut cursor = 0usize;
        for change in &self.changes {
            let span = change.span.clone();
            let in_bounds = span.start >= cursor
                && span.end <= old.len()
                && old.is_char_boundary(span.start)
                && old.is_char_boundary(span.end);
            if !in_bounds {
                return Err(TextDeltaError::SpanOutOfBounds {
                    start: span.start,
                    end: span.end,
                    len: old.len(),
                });
            }
            out.push_str(&old[cursor..span.start]);
            out.push_str(&change.new_text);
            cursor = span.end;
        }
        out.push_str(&old[cursor..]);
        Ok(out)
    }
}

/// Merge neighbouring changes whose unchanged gap is shorter than [`MIN_ANCHOR_LEN`]
///
/// The gap text is copied into the merged replacement.
fn absorb_short_anchors(old: &str, changes: Vec<TextChange>) -> Vec<TextChange> {
    let mut merged: Vec<TextChange> = Vec::with_capacity(changes.len());
    for change in changes {
        match merged.last_mut() {
            Some(last) if change.span.start - last.span.end < MIN_ANCHOR_LEN => {
                last.new_text.push_str(&old[last.span.end..change.span.start]);
                last.new_text.push_str(&change.new_text);
                last.span.end = change.span.end;
            }
            _ => merged.push(change),
        }
    }
    merged
}

impl<'de> Deserialize<'de> for TextDiff {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            changes: Vec<TextChange>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::from_changes(raw.changes).map_err(serde::de::Error::custom)
    }
}

/// Diff of one document against a known baseline text
///
/// # Invariants
/// - `base_checksum` is [`Checksum::of_text`] of the text the diff was computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDelta {
    document: DocumentId,
    base_checksum: Checksum,
    diff: TextDiff,
}

impl TextDelta {
    /// Create a delta
    #[inline]
    #[must_use]
    pub fn new(document: DocumentId, base_checksum: Checksum, diff: TextDiff) -> Self {
        Self {
            document,
            base_checksum,
            diff,
        }
    }

    /// Target document
    #[inline]
    #[must_use]
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Checksum of the baseline text
    #[inline]
    #[must_use]
    pub fn base_checksum(&self) -> Checksum {
        self.base_checksum
    }

    /// The positional diff
    #[inline]
    #[must_use]
    pub fn diff(&self) -> &TextDiff {
        &self.diff
    }

    /// Verify the receiver holds the baseline this delta was computed from
    ///
    /// # Errors
    /// Returns [`TextDeltaError::BaseMismatch`] otherwise
    pub fn validate_base(&self, text: &str) -> Result<(), TextDeltaError> {
        let actual = Checksum::of_text(text);
        if actual != self.base_checksum {
            return Err(TextDeltaError::BaseMismatch {
                expected: self.base_checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Validate the baseline, then apply
    ///
    /// # Errors
    /// Returns an error if the baseline differs or a span does not fit
    pub fn apply(&self, text: &str) -> Result<String, TextDeltaError> {
        self.validate_base(text)?;
        self.diff.apply(text)
    }
}

/// Errors when receiving or applying text diffs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextDeltaError {
    /// Receiver's text is not the baseline
    #[error("baseline mismatch: expected {expected}, got {actual}")]
    BaseMismatch { expected: Checksum, actual: Checksum },

    /// Span outside the text or splitting a character
    #[error("span {start}..{end} does not fit text of length {len}")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },

    /// Change at `index` is unsorted or overlaps its predecessor
    #[error("change {index} overlaps or precedes the previous change")]
    Overlapping { index: usize },

    /// Change at `index` has a span ending before it starts
    #[error("change {index} has reversed span {start}..{end}")]
    ReversedSpan { index: usize, start: usize, end: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProjectId;
    use proptest::prelude::*;

    fn doc() -> DocumentId {
        DocumentId::from_raw(ProjectId::from_raw(1), 1)
    }

    #[test]
    fn identical_texts_produce_empty_diff() {
        let diff = TextDiff::compute("same", "same");
        assert!(diff.is_empty());
    }

    #[test]
    fn filling_empty_document_is_single_insert() {
        let diff = TextDiff::compute("", "hello");
        assert_eq!(diff.changes(), &[TextChange::insert(0, "hello")]);
        assert!(!diff.is_full_replacement(""));
    }

    #[test]
    fn single_char_insert_is_not_full_replacement() {
        let diff = TextDiff::compute("fn main() {}", "fn main() {;}");
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.changes()[0], TextChange::insert(11, ";"));
        assert!(!diff.is_full_replacement("fn main() {}"));
    }

    #[test]
    fn replacing_everything_is_full_replacement() {
        let diff = TextDiff::compute("abc", "xyz");
        assert!(diff.is_full_replacement("abc"));
    }

    #[test]
    fn rewrite_sharing_letters_is_full_replacement() {
        let diff = TextDiff::compute("hello world", "goodbye moon");
        assert!(diff.is_full_replacement("hello world"));
        assert_eq!(diff.apply("hello world").unwrap(), "goodbye moon");
    }

    #[test]
    fn nearby_edits_fold_into_one_change() {
        let diff = TextDiff::compute("let x = 1;", "let xy = 123;");
        assert_eq!(diff.changes(), &[TextChange::new(5..9, "y = 123")]);
        assert!(!diff.is_full_replacement("let x = 1;"));
    }

    #[test]
    fn distant_edits_stay_separate() {
        let old = "fn alpha() {}\nfn beta() {}\n";
        let new = "fn alpha2() {}\nfn beta2() {}\n";
        let diff = TextDiff::compute(old, new);
        assert_eq!(diff.changes(), &[TextChange::insert(8, "2"), TextChange::insert(21, "2")]);
    }

    #[test]
    fn small_edit_in_large_text_stays_small() {
        let old: String = (0..4_000).map(|i| format!("line {i}\n")).collect();
        let mut new = old.clone();
        new.insert(old.len() / 2, '!');
        let budget = DiffBudget {
            timeout: Duration::from_secs(10),
            ..DiffBudget::default()
        };

        let diff = TextDiff::compute_within(&old, &new, &budget).unwrap();
        assert_eq!(diff.len(), 1);
        assert!(!diff.is_full_replacement(&old));
        assert_eq!(diff.apply(&old).unwrap(), new);
    }

    #[test]
    fn unrelated_large_rewrite_is_bounded() {
        fn scramble(seed: u64, len: usize) -> String {
            let mut state = seed;
            (0..len)
                .map(|_| {
                    state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                    char::from(b'a' + u8::try_from((state >> 33) % 26).unwrap())
                })
                .collect()
        }
        let old = scramble(1, 60_000);
        let new = scramble(2, 60_000);
        let budget = DiffBudget::default();

        let started = Instant::now();
        let diff = TextDiff::compute_within(&old, &new, &budget);
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
        assert!(diff.map_or(true, |d| d.is_full_replacement(&old)));

        let coarse = TextDiff::compute(&old, &new);
        assert_eq!(coarse.apply(&old).unwrap(), new);
    }

    #[test]
    fn oversized_texts_are_not_diffed() {
        let budget = DiffBudget {
            max_len: 16,
            ..DiffBudget::default()
        };
        assert!(TextDiff::compute_within("short", "short!", &budget).is_some());
        assert!(TextDiff::compute_within("short", "this text is far too long", &budget).is_none());
    }

    #[test]
    fn from_changes_rejects_reversed_span() {
        let single = TextDiff::from_changes(vec![TextChange::new(5..2, "X")]);
        assert_eq!(
            single,
            Err(TextDeltaError::ReversedSpan { index: 0, start: 5, end: 2 })
        );
        let last = TextDiff::from_changes(vec![TextChange::new(0..1, "a"), TextChange::new(6..3, "b")]);
        assert_eq!(
            last,
            Err(TextDeltaError::ReversedSpan { index: 1, start: 6, end: 3 })
        );
    }

    #[test]
    fn multibyte_offsets_are_bytes() {
        let diff = TextDiff::compute("héllo", "héllo!");
        assert_eq!(diff.changes(), &[TextChange::insert(6, "!")]);
    }

    #[test]
    fn from_changes_rejects_overlap() {
        let result = TextDiff::from_changes(vec![
            TextChange::new(0..4, "a"),
            TextChange::new(2..5, "b"),
        ]);
        assert_eq!(result, Err(TextDeltaError::Overlapping { index: 1 }));
    }

    #[test]
    fn delta_rejects_wrong_baseline() {
        let delta = TextDelta::new(doc(), Checksum::of_text("old"), TextDiff::compute("old", "older"));
        assert!(matches!(
            delta.apply("something else"),
            Err(TextDeltaError::BaseMismatch { .. })
        ));
        assert_eq!(delta.apply("old").unwrap(), "older");
    }

    #[test]
    fn apply_rejects_span_past_end() {
        let diff = TextDiff::from_changes(vec![TextChange::new(2..9, "x")]).unwrap();
        assert!(matches!(
            diff.apply("abc"),
            Err(TextDeltaError::SpanOutOfBounds { len: 3, .. })
        ));
    }

    #[test]
    fn deserialize_validates_ordering() {
        let json = r#"{"changes":[{"span":{"start":3,"end":4},"new_text":"a"},{"span":{"start":0,"end":1},"new_text":"b"}]}"#;
        assert!(serde_json::from_str::<TextDiff>(json).is_err());
    }

    proptest! {
        #[test]
        fn computed_diff_reproduces_new_text(old in "[a-zé \n]{0,40}", new in "[a-zé \n]{0,40}") {
            let diff = TextDiff::compute(&old, &new);
            prop_assert_eq!(diff.apply(&old).unwrap(), new);
            let sorted = diff.changes().windows(2).all(|w| w[0].span.end <= w[1].span.start);
            prop_assert!(sorted);
        }
    }
}
