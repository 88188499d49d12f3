//! Test clock — deterministic `Clock` implementation for tests.

use chrono::{DateTime, TimeZone, Utc};
use ship_core::clock::Clock;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock fixed at 2024-05-01T12:00:00Z.
    #[must_use]
    pub fn epoch() -> Self {
        Self(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
