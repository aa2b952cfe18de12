//! Nonce tracker (spec §3, §4.3, §5).
//!
//! Lock-guarded so that concurrent `execute` calls on the same wallet
//! get a gap-free ascending sequence — the lock itself is the critical
//! section, never held across an `.await`.

use parking_lot::Mutex;

pub struct NonceTracker {
    next: Mutex<u64>,
}

impl NonceTracker {
    /// `chain_pending` is the `pending` nonce pulled from the chain at
    /// wallet init (spec §4.3: "pulls `pending` nonce from chain").
    pub fn new(chain_pending: u64) -> Self {
        NonceTracker { next: Mutex::new(chain_pending) }
    }

    /// Returns the next nonce to use and advances the counter.
    pub fn next(&self) -> u64 {
        let mut guard = self.next.lock();
        let value = *guard;
        *guard += 1;
        value
    }

    /// Recovery path: re-sync to the chain's reported `latest` nonce.
    /// Never decreases below it, since that would risk nonce reuse.
    pub fn reset(&self, chain_latest: u64) {
        let mut guard = self.next.lock();
        if chain_latest > *guard {
            *guard = chain_latest;
        }
    }

    pub fn peek(&self) -> u64 {
        *self.next.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_strictly_increasing_values() {
        let tracker = NonceTracker::new(10);
        assert_eq!(tracker.next(), 10);
        assert_eq!(tracker.next(), 11);
        assert_eq!(tracker.next(), 12);
    }

    #[test]
    fn reset_never_decreases_below_chain_latest() {
        let tracker = NonceTracker::new(10);
        tracker.next();
        tracker.next(); // next() == 12
        tracker.reset(5); // stale, should be ignored
        assert_eq!(tracker.peek(), 12);
        tracker.reset(20); // ahead, should jump forward
        assert_eq!(tracker.peek(), 20);
    }

    #[test]
    fn concurrent_next_calls_never_collide() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(NonceTracker::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || (0..50).map(|_| tracker.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        let expected: Vec<u64> = (0..400).collect();
        assert_eq!(all, expected);
    }
}
