//! Monotonic sequence clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn wall_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// A clock that hands out strictly increasing sequence values.
///
/// Values track wall-clock milliseconds but never repeat or go backwards:
/// `next()` returns `max(now, last + 1)`. A value returned by `next()` is
/// reserved, so every later call returns something greater. This is what
/// makes a cursor taken at "now" safe to use as an exclusive lower bound.
#[derive(Debug, Default)]
pub struct SequenceClock {
    last: AtomicI64,
}

impl SequenceClock {
    /// Creates a clock with no values issued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence value.
    pub fn next(&self) -> i64 {
        let now = wall_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Returns the last issued value (0 if none).
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }

    /// Makes sure future values are greater than `value`.
    ///
    /// Used after loading persisted data stamped by an earlier process.
    pub fn observe(&self, value: i64) {
        self.last.fetch_max(value, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let clock = SequenceClock::new();
        let mut prev = clock.next();
        for _ in 0..1000 {
            let value = clock.next();
            assert!(value > prev);
            prev = value;
        }
    }

    #[test]
    fn tracks_wall_clock() {
        let clock = SequenceClock::new();
        let before = wall_millis();
        assert!(clock.next() >= before);
    }

    #[test]
    fn observe_moves_floor() {
        let clock = SequenceClock::new();
        let far = wall_millis() + 60_000;
        clock.observe(far);
        assert_eq!(clock.last(), far);
        assert_eq!(clock.next(), far + 1);

        clock.observe(0);
        assert_eq!(clock.last(), far + 1);
    }

    #[test]
    fn concurrent_values_are_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let clock = Arc::new(SequenceClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..500).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value));
            }
        }
    }
}
