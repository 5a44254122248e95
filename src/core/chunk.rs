//! Chunk container and failure localization
//!
//! A [`Chunk`] is the unit of transactional work: the items read for one commit
//! interval. It doubles as the search space used to find a single bad item when
//! a batched write fails without saying which item caused it.
//!
//! # Scan window
//!
//! The active window `[current, last)` holds the items the next attempt should
//! cover. After a failed attempt on a multi-item window the failing range is
//! remembered and the window is halved. A successful attempt on the first half
//! points at the second half, so the next window is taken from there. For a
//! range of `n` items with one deterministic culprit, at most `ceil(log2(n))`
//! attempts fail before it is found.
//!
//! The remembered range only steers window choice. An item becomes skippable
//! only after a write of that item alone has failed; a failure that does not
//! reproduce (transient, or caused by a combination of items) leaves nothing
//! to skip and the scan carries on over the rest of the chunk.
//!
//! ```
//! use chunkwise::core::chunk::Chunk;
//! use chunkwise::domain::BatchError;
//!
//! let mut chunk: Chunk<char> = "ABCD".chars().collect();
//!
//! // full write fails
//! let _ = chunk.register_failure(BatchError::Write("constraint".into()));
//! assert_eq!(chunk.items(), &['A', 'B']);
//!
//! // first half written, the failure must be in C or D
//! assert!(chunk.complete_attempt().is_err());
//! assert_eq!(chunk.items(), &['C']);
//!
//! // C fails alone
//! let _ = chunk.register_failure(BatchError::Write("constraint".into()));
//! assert!(chunk.can_skip());
//! assert_eq!(chunk.take_suspect_item(), Some('C'));
//! ```

use crate::domain::{BatchError, Result};

/// Ordered items of one commit interval plus the scan window
#[derive(Debug, Clone)]
pub struct Chunk<T> {
    items: Vec<T>,
    ordinals: Vec<usize>,
    current: usize,
    last: usize,
    /// Exclusive end of the range known to contain a failing item
    failing_end: Option<usize>,
    isolated: bool,
    pending: Option<BatchError>,
    skipped: bool,
    busy: bool,
    end: bool,
    reads: usize,
    errors: Vec<BatchError>,
}

impl<T> Default for Chunk<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Chunk<T> {
    /// Create an empty chunk
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            ordinals: Vec::new(),
            current: 0,
            last: 0,
            failing_end: None,
            isolated: false,
            pending: None,
            skipped: false,
            busy: false,
            end: false,
            reads: 0,
            errors: Vec::new(),
        }
    }

    /// Append an item, recording the read call that produced it
    pub fn add(&mut self, item: T) {
        let ordinal = self.reads;
        self.reads += 1;
        self.add_with_ordinal(item, ordinal);
    }

    /// Append an item with an explicit read ordinal
    ///
    /// Used when deriving an output chunk from an input chunk, so positions
    /// still refer to the original read calls.
    pub fn add_with_ordinal(&mut self, item: T, ordinal: usize) {
        self.items.push(item);
        self.ordinals.push(ordinal);
        if self.pending.is_none() {
            self.last = self.items.len();
        }
    }

    /// Record a read failure that was skipped
    ///
    /// The failed read still consumed a read call, which keeps ordinals aligned
    /// with the source position.
    pub fn record_read_skip(&mut self, error: BatchError) {
        self.reads += 1;
        self.errors.push(error);
    }

    /// Items in the active window
    pub fn items(&self) -> &[T] {
        &self.items[self.current..self.last]
    }

    /// Every item still held by the chunk
    pub fn all_items(&self) -> &[T] {
        &self.items
    }

    /// Items together with their read ordinals
    pub fn iter_with_ordinals(&self) -> impl Iterator<Item = (&T, usize)> {
        self.items.iter().zip(self.ordinals.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of read calls made while filling this chunk
    pub fn read_calls(&self) -> usize {
        self.reads
    }

    /// Drop all items and reset the scan state
    pub fn clear(&mut self) {
        self.items.clear();
        self.ordinals.clear();
        self.current = 0;
        self.last = 0;
        self.failing_end = None;
        self.isolated = false;
        self.pending = None;
        self.skipped = false;
    }

    /// Active window bounds as `(current, last)`
    pub fn window(&self) -> (usize, usize) {
        (self.current, self.last)
    }

    /// Error of the latest failed attempt, if the chunk is not clean yet
    pub fn pending_error(&self) -> Option<&BatchError> {
        self.pending.as_ref()
    }

    /// Record a failed attempt over the active window
    ///
    /// A multi-item window is halved so the next attempt covers its first half.
    /// A single-item window means the culprit is isolated. The error is handed
    /// back so callers can write `return Err(chunk.register_failure(e))`.
    pub fn register_failure(&mut self, error: BatchError) -> BatchError {
        self.pending = Some(error.clone());
        let span = self.last.saturating_sub(self.current);
        if span <= 1 {
            self.failing_end = Some(self.last);
            self.isolated = span == 1;
        } else {
            self.failing_end = Some(self.last);
            self.isolated = false;
            self.last = self.current + (span / 2).max(1);
        }
        tracing::debug!(
            current = self.current,
            last = self.last,
            isolated = self.isolated,
            "Chunk attempt failed, narrowing scan window"
        );
        error
    }

    /// Enter an item-by-item scan after the whole chunk failed
    ///
    /// Unlike [`Chunk::register_failure`] the window is left alone, so no range
    /// is presumed to contain the culprit.
    pub fn begin_scan(&mut self, error: BatchError) {
        self.pending = Some(error);
        self.failing_end = None;
        self.isolated = false;
    }

    /// Record that the active window was handled
    ///
    /// Called after the window was written, or after its suspect was taken.
    ///
    /// # Errors
    ///
    /// Returns the pending error while part of the chunk still needs scanning.
    /// `Ok` means the chunk is clean: the window is reset to the whole chunk and
    /// the pending error is cleared.
    pub fn complete_attempt(&mut self) -> Result<()> {
        self.current = self.last;
        self.isolated = false;

        if let Some(failing_end) = self.failing_end {
            if failing_end > self.current {
                // suspect range is [current, failing_end)
                let span = failing_end - self.current;
                if span == 1 {
                    // must still fail alone before it can be skipped
                    self.last = failing_end;
                } else {
                    self.last = self.current + span / 2;
                }
                return Err(self.rethrow());
            }
            self.failing_end = None;
        }

        if self.current >= self.items.len() {
            self.current = 0;
            self.last = self.items.len();
            self.pending = None;
            return Ok(());
        }

        self.last = self.items.len();
        Err(self.rethrow())
    }

    fn rethrow(&self) -> BatchError {
        self.pending
            .clone()
            .unwrap_or_else(|| BatchError::Other("chunk scan incomplete".to_string()))
    }

    /// Narrow the window to the single item at `current`
    pub fn focus_single(&mut self) {
        if self.current < self.items.len() {
            self.last = self.current + 1;
        }
    }

    /// Whether the single suspect item is identified
    pub fn can_skip(&self) -> bool {
        self.isolated && self.last == self.current + 1 && self.current < self.items.len()
    }

    /// Whether another attempt on the chunk makes sense
    pub fn can_retry(&self) -> bool {
        self.pending.is_none() || self.can_skip()
    }

    /// Remove the isolated suspect item
    ///
    /// Returns `None` unless [`Chunk::can_skip`] holds.
    pub fn take_suspect_item(&mut self) -> Option<T> {
        if !self.can_skip() {
            return None;
        }
        let item = self.items.remove(self.current);
        self.ordinals.remove(self.current);
        self.last -= 1;
        self.failing_end = None;
        self.isolated = false;
        self.skipped = true;
        Some(item)
    }

    /// Remove the item at `index`, keeping the window consistent
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.ordinals.remove(index);
        if index < self.current {
            self.current -= 1;
            self.last -= 1;
        } else if index < self.last {
            self.last -= 1;
        }
        if let Some(end) = self.failing_end.as_mut() {
            if index < *end {
                *end -= 1;
            }
        }
        Some(item)
    }

    /// Ordinal of the first item not yet handled by the scan
    pub fn first_unresolved_ordinal(&self) -> Option<usize> {
        self.ordinals.get(self.current).copied()
    }

    /// Whether an item was taken as a suspect
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Whether the chunk must be carried into the next transaction
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Whether the source was exhausted while filling this chunk
    pub fn is_end(&self) -> bool {
        self.end
    }

    pub fn set_end(&mut self) {
        self.end = true;
    }

    /// Read failures skipped while filling this chunk
    pub fn errors(&self) -> &[BatchError] {
        &self.errors
    }

    /// Drain the recorded read failures
    pub fn take_errors(&mut self) -> Vec<BatchError> {
        std::mem::take(&mut self.errors)
    }
}

impl<T> FromIterator<T> for Chunk<T> {
    fn from_iter<It: IntoIterator<Item = T>>(iter: It) -> Self {
        let mut chunk = Chunk::new();
        for item in iter {
            chunk.add(item);
        }
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> BatchError {
        BatchError::Write("boom".to_string())
    }

    /// Drive a bisection scan against a chunk where `bad` always fails.
    /// Returns the number of failed probes after the initial full failure.
    fn isolate(len: usize, bad: usize) -> (usize, usize) {
        let mut chunk: Chunk<usize> = (0..len).collect();
        let _ = chunk.register_failure(failure());
        let mut failed_probes = 0;

        loop {
            if chunk.can_skip() {
                let suspect = chunk.take_suspect_item().unwrap();
                return (suspect, failed_probes);
            }
            if chunk.items().contains(&bad) {
                failed_probes += 1;
                let _ = chunk.register_failure(failure());
            } else {
                let _ = chunk.complete_attempt();
            }
        }
    }

    #[test]
    fn test_add_tracks_window_and_ordinals() {
        let mut chunk = Chunk::new();
        chunk.add("a");
        chunk.record_read_skip(BatchError::Read("bad".into()));
        chunk.add("b");

        assert_eq!(chunk.items(), &["a", "b"]);
        assert_eq!(chunk.read_calls(), 3);
        let ordinals: Vec<usize> = chunk.iter_with_ordinals().map(|(_, o)| o).collect();
        assert_eq!(ordinals, vec![0, 2]);
        assert_eq!(chunk.errors().len(), 1);
    }

    #[test]
    fn test_register_failure_halves_window() {
        let mut chunk: Chunk<u32> = (0..7).collect();
        let err = chunk.register_failure(failure());

        assert_eq!(err, failure());
        assert_eq!(chunk.window(), (0, 3));
        assert!(!chunk.can_skip());
        assert!(!chunk.can_retry());
    }

    #[test]
    fn test_halving_to_one_item_is_not_yet_skippable() {
        let mut chunk: Chunk<u32> = (0..2).collect();
        let _ = chunk.register_failure(failure());

        assert_eq!(chunk.items(), &[0]);
        assert!(!chunk.can_skip());

        let _ = chunk.register_failure(failure());
        assert!(chunk.can_skip());
        assert!(chunk.can_retry());
    }

    #[test]
    fn test_success_on_first_half_narrows_to_second_half() {
        let mut chunk: Chunk<u32> = (0..8).collect();
        let _ = chunk.register_failure(failure());
        assert_eq!(chunk.window(), (0, 4));

        assert!(chunk.complete_attempt().is_err());
        assert_eq!(chunk.window(), (4, 6));
    }

    #[test]
    fn test_last_suspect_must_fail_alone_before_skip() {
        let mut chunk: Chunk<char> = "ABC".chars().collect();
        let _ = chunk.register_failure(failure());
        assert_eq!(chunk.items(), &['A']);

        // A written, B is the first of the remaining suspects
        assert!(chunk.complete_attempt().is_err());
        assert_eq!(chunk.items(), &['B']);
        assert!(chunk.complete_attempt().is_err());

        // only C is left in the failing range, but it has not failed alone
        assert_eq!(chunk.items(), &['C']);
        assert!(!chunk.can_skip());
        assert_eq!(chunk.take_suspect_item(), None);

        // the earlier failure does not reproduce
        assert!(chunk.complete_attempt().is_ok());
        assert_eq!(chunk.all_items(), &['A', 'B', 'C']);
        assert!(!chunk.is_skipped());
    }

    #[test]
    fn test_clean_chunk_resets_window() {
        let mut chunk: Chunk<u32> = (0..4).collect();
        assert!(chunk.complete_attempt().is_ok());
        assert_eq!(chunk.window(), (0, 4));
        assert!(chunk.pending_error().is_none());
    }

    #[test]
    fn test_take_suspect_then_scan_rest() {
        let mut chunk: Chunk<char> = "DEF".chars().collect();
        chunk.focus_single();
        let _ = chunk.register_failure(failure());
        assert!(chunk.can_skip());
        assert_eq!(chunk.take_suspect_item(), Some('D'));
        assert!(chunk.is_skipped());

        // remaining items are rescanned from the start of the window
        assert!(chunk.complete_attempt().is_err());
        assert_eq!(chunk.items(), &['E', 'F']);

        assert!(chunk.complete_attempt().is_ok());
        assert_eq!(chunk.all_items(), &['E', 'F']);
        assert!(chunk.pending_error().is_none());
    }

    #[test]
    fn test_take_suspect_requires_isolation() {
        let mut chunk: Chunk<u32> = (0..4).collect();
        assert_eq!(chunk.take_suspect_item(), None);
        let _ = chunk.register_failure(failure());
        assert_eq!(chunk.take_suspect_item(), None);
    }

    #[test]
    fn test_bisection_finds_every_position() {
        for len in 1..=17 {
            let bound = (len as f64).log2().ceil() as usize;
            for bad in 0..len {
                let (suspect, failed_probes) = isolate(len, bad);
                assert_eq!(suspect, bad, "len {len}");
                assert!(
                    failed_probes <= bound,
                    "len {len} bad {bad}: {failed_probes} failed probes"
                );
            }
        }
    }

    #[test]
    fn test_item_scan_probes_every_item() {
        let mut chunk: Chunk<u32> = (0..3).collect();
        chunk.begin_scan(failure());
        assert_eq!(chunk.window(), (0, 3));

        // 0 and 1 succeed alone; 2 is still probed rather than inferred
        for _ in 0..2 {
            chunk.focus_single();
            assert!(chunk.complete_attempt().is_err());
        }
        chunk.focus_single();
        assert!(!chunk.can_skip());
        let _ = chunk.register_failure(failure());
        assert_eq!(chunk.take_suspect_item(), Some(2));
        assert!(chunk.complete_attempt().is_ok());
        assert_eq!(chunk.all_items(), &[0, 1]);
    }

    #[test]
    fn test_first_unresolved_ordinal_follows_scan() {
        let mut chunk: Chunk<u32> = (0..4).collect();
        assert_eq!(chunk.first_unresolved_ordinal(), Some(0));

        chunk.focus_single();
        assert!(chunk.complete_attempt().is_err());
        assert_eq!(chunk.first_unresolved_ordinal(), Some(1));
    }

    #[test]
    fn test_remove_keeps_window_consistent() {
        let mut chunk: Chunk<u32> = (0..6).collect();
        let _ = chunk.register_failure(failure());
        assert_eq!(chunk.window(), (0, 3));

        assert_eq!(chunk.remove(1), Some(1));
        assert_eq!(chunk.window(), (0, 2));
        assert_eq!(chunk.items(), &[0, 2]);
        assert_eq!(chunk.remove(10), None);
    }

    #[test]
    fn test_clear() {
        let mut chunk: Chunk<u32> = (0..3).collect();
        let _ = chunk.register_failure(failure());
        chunk.clear();
        assert!(chunk.is_empty());
        assert!(chunk.can_retry());
        assert_eq!(chunk.window(), (0, 0));
    }
}
