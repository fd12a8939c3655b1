//! Exclusive scopes over inventory items and orders.
//!
//! A reconciliation takes every key it will touch in one step, so two
//! operations never hold overlapping halves of each other's scope. Waiting is
//! bounded by the configured timeout.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

use sheetkeeper_core::OrderId;
use sheetkeeper_inventory::ItemId;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeKey {
    Item(ItemId),
    Order(OrderId),
}

impl core::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ScopeKey::Item(id) => write!(f, "item:{id}"),
            ScopeKey::Order(id) => write!(f, "order:{id}"),
        }
    }
}

#[derive(Debug, Error)]
#[error("scope busy after {waited:?}: {keys:?}")]
pub struct ScopeBusy {
    pub keys: Vec<ScopeKey>,
    pub waited: Duration,
}

#[derive(Debug)]
pub struct ScopeLocks {
    held: Mutex<HashSet<ScopeKey>>,
    released: Condvar,
    timeout: Duration,
}

impl Default for ScopeLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl ScopeLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    fn held(&self) -> MutexGuard<'_, HashSet<ScopeKey>> {
        match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Acquire all `keys` at once, waiting until none of them is held elsewhere.
    pub fn acquire<I>(&self, keys: I) -> Result<ScopeGuard<'_>, ScopeBusy>
    where
        I: IntoIterator<Item = ScopeKey>,
    {
        let keys: BTreeSet<ScopeKey> = keys.into_iter().collect();
        let started = Instant::now();
        let deadline = started + self.timeout;

        let mut held = self.held();
        while keys.iter().any(|k| held.contains(k)) {
            let now = Instant::now();
            if now >= deadline {
                let busy: Vec<ScopeKey> = keys.iter().filter(|k| held.contains(*k)).cloned().collect();
                tracing::warn!(keys = ?busy, "scope acquisition timed out");
                return Err(ScopeBusy {
                    keys: busy,
                    waited: now - started,
                });
            }
            held = match self.released.wait_timeout(held, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }

        held.extend(keys.iter().cloned());
        Ok(ScopeGuard { locks: self, keys })
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        self.held().len()
    }
}

/// Releases its keys on drop.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    locks: &'a ScopeLocks,
    keys: BTreeSet<ScopeKey>,
}

impl ScopeGuard<'_> {
    pub fn covers(&self, key: &ScopeKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ScopeKey> {
        self.keys.iter()
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held();
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(id: &str) -> ScopeKey {
        ScopeKey::Item(ItemId::parse(id).unwrap())
    }

    #[test]
    fn disjoint_scopes_do_not_block_each_other() {
        let locks = ScopeLocks::default();
        let a = locks.acquire([item("A")]).unwrap();
        let b = locks.acquire([item("B")]).unwrap();
        assert!(a.covers(&item("A")));
        assert!(!a.covers(&item("B")));
        assert_eq!(locks.held_count(), 2);
        drop((a, b));
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn overlapping_scope_times_out() {
        let locks = ScopeLocks::new(Duration::from_millis(20));
        let _held = locks.acquire([item("A"), item("B")]).unwrap();

        match locks.acquire([item("B"), item("C")]) {
            Err(busy) => assert_eq!(busy.keys, vec![item("B")]),
            Ok(_) => panic!("expected ScopeBusy"),
        }
        // Nothing of the failed attempt is left behind.
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn waiters_proceed_once_the_scope_is_released() {
        let locks = Arc::new(ScopeLocks::new(Duration::from_secs(5)));
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    let _guard = locks.acquire([item("A")]).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    std::thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(locks.held_count(), 0);
    }
}
