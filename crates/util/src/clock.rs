//! Wall-clock access behind a trait seam.
//!
//! Execution consults the clock for `system.*` template tokens, dynamic
//! date/time generators, and circuit-breaker open windows. Tests install a
//! [`FixedClock`] so time-dependent behavior is deterministic.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, Utc};

/// Supplies the current local and UTC instants.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
    /// Current instant in the local timezone.
    fn now_local(&self) -> DateTime<FixedOffset>;
}

/// Production clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Settable clock for tests. The instant only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock pinned to the given instant.
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: Duration) {
        let mut instant = self.instant.lock().expect("clock lock poisoned");
        *instant += delta;
    }

    /// Pins the clock to a new instant.
    pub fn set(&self, new_instant: DateTime<Utc>) {
        let mut instant = self.instant.lock().expect("clock lock poisoned");
        *instant = new_instant;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.instant.lock().expect("clock lock poisoned")
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        self.now_utc().fixed_offset()
    }
}
