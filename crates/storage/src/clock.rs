//! Store-observed time.
//!
//! Lease expiry and ticket expiry are both judged against the clock the store
//! exposes, never against a node's own wall clock. Adapters backed by a real
//! database return the server timestamp; [`MemoryBackend`](crate::MemoryBackend)
//! delegates to an injected [`Clock`].
//!
//! [`ManualClock`] is a settable clock for deterministic tests:
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use ticket_registry_storage::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(Utc.timestamp_opt(0, 0).unwrap());
//! clock.advance(Duration::seconds(35));
//! assert_eq!(clock.now().timestamp(), 35);
//! ```

use std::{fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Source of the current timestamp.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to the store
/// and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(RwLock::new(start)) }
    }

    /// Moves the clock to `instant`. Moving backwards is allowed so tests can
    /// model a store whose clock was corrected.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write();
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::default();
        let observer = clock.clone();

        clock.advance(Duration::seconds(5));
        assert_eq!(observer.now().timestamp(), 5);

        observer.set(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(100));
        assert_eq!(clock.now().timestamp(), 100);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
