use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

/// Number of stripes used when none is configured.
pub const DEFAULT_STRIPES: usize = 64;

/// Striped per-key mutual exclusion.
///
/// A fixed table of mutexes; a key always maps to the same stripe, so two
/// mutations of one key never run at once. Unrelated keys only contend
/// when they hash to the same stripe.
pub struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    /// Create a table with `stripes` mutexes (at least one).
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    /// Block until the stripe for `key` is free and hold it.
    ///
    /// The mutexes guard no data, so a poisoned stripe is simply reused.
    pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl std::fmt::Debug for KeyLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLocks")
            .field("stripes", &self.stripes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_stripes_rounds_up_to_one() {
        assert_eq!(KeyLocks::new(0).stripe_count(), 1);
        assert_eq!(KeyLocks::default().stripe_count(), DEFAULT_STRIPES);
    }

    #[test]
    fn same_key_same_stripe() {
        let locks = KeyLocks::new(16);
        assert_eq!(locks.stripe_of("0001"), locks.stripe_of("0001"));
        assert!(locks.stripe_of("anything") < 16);
    }

    #[test]
    fn lock_excludes_concurrent_holders() {
        let locks = Arc::new(KeyLocks::new(4));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _guard = locks.lock("same-key");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn poisoned_stripe_is_reusable() {
        let locks = Arc::new(KeyLocks::new(1));
        let poisoner = Arc::clone(&locks);
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock("k");
            panic!("poison the stripe");
        })
        .join();
        let _guard = locks.lock("k");
    }
}
