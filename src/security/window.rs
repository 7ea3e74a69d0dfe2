//! Keyed sliding-window event counter.
//!
//! # Responsibilities
//! - Keep per-key event timestamps inside a trailing horizon
//! - Admit or refuse an event against a limit atomically per key
//! - Reclaim idle keys on a maintenance sweep
//!
//! # Design Decisions
//! - Eviction is lazy: every access purges events older than the horizon
//! - All read-modify-write happens under the DashMap shard guard for the key,
//!   so a sweep never drops a window while a request is appending to it
//! - The horizon is passed per call so policy reloads take effect immediately
//! - The reported window start is the oldest retained event, so callers can derive
//!   the exact moment the next slot frees up

use std::collections::VecDeque;

use dashmap::DashMap;

/// Events recorded for one key, oldest first.
#[derive(Debug, Clone, Default)]
struct ActivityWindow {
    events: VecDeque<u64>,
}

impl ActivityWindow {
    fn purge(&mut self, now: u64, horizon_ms: u64) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_sub(oldest) < horizon_ms {
                break;
            }
            self.events.pop_front();
        }
    }

    /// The oldest retained event, or `now` for an empty window.
    fn started_at(&self, now: u64) -> u64 {
        self.events.front().copied().unwrap_or(now)
    }
}

/// Snapshot of a window after an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Whether the current event was recorded.
    pub admitted: bool,
    /// Events retained after the access.
    pub count: usize,
    /// Timestamp of the oldest retained event (epoch ms). The window next frees
    /// a slot at `window_start + horizon`.
    pub window_start: u64,
}

/// Concurrent map of key → activity window.
#[derive(Debug, Default)]
pub struct SlidingWindowCounter {
    windows: DashMap<String, ActivityWindow>,
}

impl SlidingWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event unconditionally and return the retained count.
    pub fn record(&self, key: &str, now: u64, horizon_ms: u64) -> WindowState {
        let mut window = self
            .windows
            .entry(key.to_owned())
            .or_default();
        window.purge(now, horizon_ms);
        window.events.push_back(now);

        WindowState {
            admitted: true,
            count: window.events.len(),
            window_start: window.started_at(now),
        }
    }

    /// Record an event only if fewer than `limit` events are retained.
    ///
    /// A refused event is not counted.
    pub fn try_record(&self, key: &str, now: u64, horizon_ms: u64, limit: usize) -> WindowState {
        let mut window = self
            .windows
            .entry(key.to_owned())
            .or_default();
        window.purge(now, horizon_ms);

        let admitted = window.events.len() < limit;
        if admitted {
            window.events.push_back(now);
        }

        WindowState {
            admitted,
            count: window.events.len(),
            window_start: window.started_at(now),
        }
    }

    /// Number of events retained for `key` inside the horizon.
    pub fn count(&self, key: &str, now: u64, horizon_ms: u64) -> usize {
        match self.windows.get_mut(key) {
            Some(mut window) => {
                window.purge(now, horizon_ms);
                window.events.len()
            }
            None => 0,
        }
    }

    /// Drop every window whose newest event is at least `retention_ms` old.
    ///
    /// Returns the number of windows removed.
    pub fn sweep(&self, now: u64, retention_ms: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window
                .events
                .back()
                .is_some_and(|&newest| now.saturating_sub(newest) < retention_ms)
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.windows.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: u64 = 60_000;

    #[test]
    fn test_record_counts_within_horizon() {
        let counter = SlidingWindowCounter::new();
        let start = 1_000_000;

        for i in 0..5 {
            let state = counter.record("10.0.0.1", start + i, MINUTE);
            assert_eq!(state.count, i as usize + 1);
        }
        assert_eq!(counter.count("10.0.0.1", start + 10, MINUTE), 5);

        // All five fall out of the window one horizon later.
        assert_eq!(counter.count("10.0.0.1", start + 4 + MINUTE, MINUTE), 0);
    }

    #[test]
    fn test_events_exactly_at_horizon_are_evicted() {
        let counter = SlidingWindowCounter::new();
        counter.record("k", 1_000, MINUTE);
        assert_eq!(counter.count("k", 1_000 + MINUTE - 1, MINUTE), 1);
        assert_eq!(counter.count("k", 1_000 + MINUTE, MINUTE), 0);
    }

    #[test]
    fn test_try_record_refuses_without_counting() {
        let counter = SlidingWindowCounter::new();
        let now = 5_000_000;

        for _ in 0..3 {
            assert!(counter.try_record("k", now, MINUTE, 3).admitted);
        }
        let refused = counter.try_record("k", now, MINUTE, 3);
        assert!(!refused.admitted);
        assert_eq!(refused.count, 3);
        assert_eq!(counter.count("k", now, MINUTE), 3);
    }

    #[test]
    fn test_window_start_anchor() {
        let counter = SlidingWindowCounter::new();
        let t0 = 2_000_000;

        let first = counter.record("k", t0, MINUTE);
        assert_eq!(first.window_start, t0);

        let later = counter.record("k", t0 + 30_000, MINUTE);
        assert_eq!(later.window_start, t0);

        // t0 has expired; the start moves to the oldest survivor.
        let rolled = counter.record("k", t0 + MINUTE + 1, MINUTE);
        assert_eq!(rolled.window_start, t0 + 30_000);

        // Fully drained window re-anchors at the new event.
        let fresh = counter.record("k", t0 + 10 * MINUTE, MINUTE);
        assert_eq!(fresh.window_start, t0 + 10 * MINUTE);
        assert_eq!(fresh.count, 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let counter = SlidingWindowCounter::new();
        counter.record("a", 100, MINUTE);
        counter.record("a", 101, MINUTE);
        counter.record("b", 102, MINUTE);

        assert_eq!(counter.count("a", 103, MINUTE), 2);
        assert_eq!(counter.count("b", 103, MINUTE), 1);
        assert_eq!(counter.count("missing", 103, MINUTE), 0);
    }

    #[test]
    fn test_sweep_removes_idle_keys_only() {
        let counter = SlidingWindowCounter::new();
        counter.record("idle", 0, MINUTE);
        counter.record("active", 0, MINUTE);
        counter.record("active", 50_000, MINUTE);

        let removed = counter.sweep(55_000, 50_000);
        assert_eq!(removed, 1);
        assert!(!counter.contains_key("idle"));
        assert!(counter.contains_key("active"));
        assert_eq!(counter.len(), 1);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        use std::sync::Arc;

        let counter = Arc::new(SlidingWindowCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        counter.record("shared", 1_000, MINUTE);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.count("shared", 1_000, MINUTE), 800);
    }
}
