//! Replay guard: the (timestamp, nonce) pairs accepted within the freshness
//! window.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use rps_shared::clock::wire_delta;
use rps_shared::crypto::Nonce;

#[derive(Debug, Default)]
pub struct ReplayGuard {
    entries: Mutex<HashSet<(u32, Nonce)>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the set half-updated, so a
    // poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, HashSet<(u32, Nonce)>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record the pair and report whether it had already been recorded.
    /// The check and the insert happen under one lock.
    pub fn seen_and_record(&self, timestamp: u32, nonce: Nonce) -> bool {
        !self.lock().insert((timestamp, nonce))
    }

    /// Drop every entry more than `window` seconds older than `now`.
    /// Returns how many were removed.
    pub fn sweep(&self, now: u32, window: u32) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(timestamp, _)| wire_delta(now, *timestamp) <= i64::from(window));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const NOW: u32 = 1_156_727_880;

    #[test]
    fn test_first_sighting_is_not_a_replay() {
        let guard = ReplayGuard::new();
        assert!(!guard.seen_and_record(NOW, [1; 8]));
        assert!(guard.seen_and_record(NOW, [1; 8]));
        // same nonce, different timestamp is a distinct entry
        assert!(!guard.seen_and_record(NOW + 1, [1; 8]));
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_sweep_keeps_entries_inside_window() {
        let guard = ReplayGuard::new();
        guard.seen_and_record(NOW - 121, [1; 8]);
        guard.seen_and_record(NOW - 120, [2; 8]);
        guard.seen_and_record(NOW, [3; 8]);
        guard.seen_and_record(NOW + 30, [4; 8]);

        assert_eq!(guard.sweep(NOW, 120), 1);
        assert_eq!(guard.len(), 3);
        assert!(guard.seen_and_record(NOW - 120, [2; 8]));
        assert!(!guard.seen_and_record(NOW - 121, [1; 8]));
    }

    #[test]
    fn test_sweep_across_wrap() {
        let guard = ReplayGuard::new();
        guard.seen_and_record(u32::MAX - 10, [1; 8]);
        guard.seen_and_record(u32::MAX - 500, [2; 8]);

        // 5 seconds past the wrap: the first entry is 16s old
        assert_eq!(guard.sweep(5, 120), 1);
        assert!(guard.seen_and_record(u32::MAX - 10, [1; 8]));
    }

    #[test]
    fn test_concurrent_duplicates_accept_once() {
        let guard = Arc::new(ReplayGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.seen_and_record(NOW, [9; 8]))
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|seen| !seen)
            .count();
        assert_eq!(fresh, 1);
    }
}
