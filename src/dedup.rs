use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

/// Default threshold above which the periodic sweep clears the set.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Set of bot message ids that were already mirrored.
///
/// Grows until a sweep finds it above `max_entries`, then it is cleared in
/// one go. Ids processed before a clear become unseen again.
pub struct DedupTracker {
    seen: Mutex<HashSet<i32>>,
    max_entries: usize,
}

impl DedupTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i32>> {
        // The set holds plain integers, a poisoned guard is still consistent.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seen(&self, id: i32) -> bool {
        self.lock().contains(&id)
    }

    pub fn mark_seen(&self, id: i32) {
        self.lock().insert(id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clear the whole set if it grew past the threshold.
    /// Returns true when a clear happened.
    pub fn sweep(&self) -> bool {
        let mut seen = self.lock();
        if seen.len() > self.max_entries {
            info!("Clearing {} processed message ids", seen.len());
            seen.clear();
            true
        } else {
            debug!(
                "Processed message set at {}/{}, nothing to clear",
                seen.len(),
                self.max_entries
            );
            false
        }
    }
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_then_seen() {
        let tracker = DedupTracker::default();
        assert!(!tracker.seen(42));
        tracker.mark_seen(42);
        assert!(tracker.seen(42));
        assert!(!tracker.seen(43));
    }

    #[test]
    fn test_sweep_below_threshold_keeps_entries() {
        let tracker = DedupTracker::new(3);
        for id in 0..3 {
            tracker.mark_seen(id);
        }
        assert!(!tracker.sweep());
        assert_eq!(tracker.len(), 3);
        assert!(tracker.seen(0));
    }

    #[test]
    fn test_sweep_above_threshold_clears_everything() {
        let tracker = DedupTracker::new(3);
        for id in 0..4 {
            tracker.mark_seen(id);
        }
        assert!(tracker.sweep());
        assert!(tracker.is_empty());
        for id in 0..4 {
            assert!(!tracker.seen(id));
        }
    }

    #[test]
    fn test_marking_same_id_twice_counts_once() {
        let tracker = DedupTracker::new(1);
        tracker.mark_seen(7);
        tracker.mark_seen(7);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.sweep());
    }
}
