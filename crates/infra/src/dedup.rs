//! Duplicate-submission guard.
//!
//! Remembers order fingerprints for a fixed window measured from the first
//! submission. The check and the record happen under one lock, so two
//! identical submissions racing each other cannot both be accepted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Default window, in seconds from first submission.
pub const DEFAULT_DEDUP_WINDOW_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    Fresh,
    /// Seen within the window; carries the time of the first submission.
    Duplicate(DateTime<Utc>),
}

#[derive(Debug)]
struct Entries {
    seen: HashMap<String, DateTime<Utc>>,
    last_sweep: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct DedupGuard {
    window: Duration,
    entries: Mutex<Entries>,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_DEDUP_WINDOW_SECS))
    }
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(Entries {
                seen: HashMap::new(),
                last_sweep: None,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Atomically test `fingerprint` and record it when fresh.
    ///
    /// A stale entry encountered here is replaced; a full sweep of expired
    /// entries runs at most once per window so memory stays bounded by the
    /// submissions of roughly two windows.
    pub fn check_and_record(&self, fingerprint: &str, now: DateTime<Utc>) -> DedupOutcome {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };

        if entries
            .last_sweep
            .is_none_or(|at| now - at >= self.window)
        {
            let window = self.window;
            let before = entries.seen.len();
            entries.seen.retain(|_, first| now - *first < window);
            entries.last_sweep = Some(now);
            let evicted = before - entries.seen.len();
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired fingerprints");
            }
        }

        match entries.seen.get(fingerprint) {
            Some(first) if now - *first < self.window => DedupOutcome::Duplicate(*first),
            _ => {
                entries.seen.insert(fingerprint.to_string(), now);
                DedupOutcome::Fresh
            }
        }
    }

    /// Forget a fingerprint recorded at `recorded_at`.
    ///
    /// Only removes the entry if it still carries that timestamp, so a
    /// release never clears a newer submission's record.
    pub fn release(&self, fingerprint: &str, recorded_at: DateTime<Utc>) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.seen.get(fingerprint) == Some(&recorded_at) {
            entries.seen.remove(fingerprint);
            true
        } else {
            false
        }
    }

    /// Number of fingerprints currently held (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn resubmission_inside_the_window_is_a_duplicate() {
        let guard = DedupGuard::default();
        assert_eq!(guard.check_and_record("fp", t0()), DedupOutcome::Fresh);
        assert_eq!(
            guard.check_and_record("fp", t0() + Duration::seconds(2)),
            DedupOutcome::Duplicate(t0())
        );
        assert_eq!(
            guard.check_and_record("other", t0() + Duration::seconds(2)),
            DedupOutcome::Fresh
        );
    }

    #[test]
    fn window_runs_from_the_first_submission() {
        let guard = DedupGuard::default();
        guard.check_and_record("fp", t0());
        // Duplicates do not extend the window.
        guard.check_and_record("fp", t0() + Duration::seconds(20));
        assert_eq!(
            guard.check_and_record("fp", t0() + Duration::seconds(35)),
            DedupOutcome::Fresh
        );
    }

    #[test]
    fn expired_entries_are_swept() {
        let guard = DedupGuard::new(Duration::seconds(10));
        for i in 0..50 {
            guard.check_and_record(&format!("fp-{i}"), t0());
        }
        assert_eq!(guard.len(), 50);

        guard.check_and_record("late", t0() + Duration::seconds(11));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn release_is_compare_and_remove() {
        let guard = DedupGuard::default();
        guard.check_and_record("fp", t0());

        assert!(!guard.release("fp", t0() + Duration::seconds(1)));
        assert!(guard.release("fp", t0()));
        assert_eq!(
            guard.check_and_record("fp", t0() + Duration::seconds(1)),
            DedupOutcome::Fresh
        );
    }

    #[test]
    fn concurrent_identical_submissions_admit_exactly_one() {
        let guard = Arc::new(DedupGuard::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.check_and_record("same", t0()))
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == DedupOutcome::Fresh)
            .count();
        assert_eq!(fresh, 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

            #[test]
            fn duplicate_iff_an_accepted_submission_is_still_in_window(
                gaps in proptest::collection::vec(0i64..20, 1..30)
            ) {
                let guard = DedupGuard::default();
                let mut now = t0();
                let mut accepted: Option<DateTime<Utc>> = None;

                for gap in gaps {
                    now += Duration::seconds(gap);
                    let expected = match accepted {
                        Some(first) if now - first < Duration::seconds(30) => DedupOutcome::Duplicate(first),
                        _ => {
                            accepted = Some(now);
                            DedupOutcome::Fresh
                        }
                    };
                    prop_assert_eq!(guard.check_and_record("fp", now), expected);
                }
            }
        }
    }
}
