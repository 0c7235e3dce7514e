//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over system time so aggregates, envelopes, and the outbox
/// publisher can be driven by a fixed clock in tests.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
