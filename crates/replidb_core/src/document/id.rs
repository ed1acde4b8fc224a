//! Document identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Unique identifier for a document within a collection.
///
/// Ids are 64-bit values that are:
/// - Totally ordered (the collection's primary key order)
/// - Assigned monotonically by [`DocId::new`] within a process
/// - Immutable once assigned
///
/// Ordering carries no meaning beyond key comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(i64);

impl DocId {
    /// Creates a new, never-before-issued id.
    ///
    /// Seeded from the wall clock in microseconds so ids generated by a
    /// later process still sort after earlier ones.
    #[must_use]
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();

        let mut prev = LAST_ID.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(prev + 1);
            match LAST_ID.compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return Self(candidate),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Creates an id from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_value(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.0)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DocId {
    fn from(value: i64) -> Self {
        Self::from_value(value)
    }
}

impl From<DocId> for i64 {
    fn from(id: DocId) -> Self {
        id.0
    }
}
