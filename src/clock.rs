//! Time sources used by the pipeline.
//!
//! Every time-dependent component (token refill, session expiry, metrics
//! uptime) reads time through the [`Clock`] trait so that tests and callers
//! can substitute simulated time.
//!
//! # Overview
//!
//! - [`SystemClock`]: real time. Monotonic readings come from
//!   [`tokio::time::Instant`], so they follow tokio's paused clock in tests.
//! - [`ManualClock`]: simulated time that only moves when [`ManualClock::advance`]
//!   is called.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use shopify_pipeline::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//!
//! clock.advance(Duration::from_secs(5));
//!
//! assert_eq!(clock.elapsed(), Duration::from_secs(5));
//! assert_eq!((clock.now() - start).num_seconds(), 5);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// A shared, dynamically dispatched clock.
pub type SharedClock = Arc<dyn Clock>;

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic time elapsed since this clock was created.
    ///
    /// Never decreases between calls.
    fn elapsed(&self) -> Duration;

    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose monotonic origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Creates a [`SharedClock`] backed by real time.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated time that advances only on request.
///
/// Both readings move together: advancing by five seconds moves the
/// monotonic reading and the wall-clock reading by five seconds.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: DateTime<Utc>,
}

impl ManualClock {
    /// Creates a manual clock starting at the current wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Creates a manual clock starting at the given wall-clock time.
    #[must_use]
    pub const fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
            }),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.elapsed = state.elapsed.saturating_add(by);
        if let Some(wall) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|delta| state.wall.checked_add_signed(delta))
        {
            state.wall = wall;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    fn now(&self) -> DateTime<Utc> {
        self.state.lock().wall
    }
}

// Verify clocks are Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SystemClock>();
    assert_send_sync::<ManualClock>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_starts_at_zero_elapsed() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_advances_both_readings() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);

        clock.advance(Duration::from_millis(1500));

        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.elapsed();
        let second = clock.elapsed();
        assert!(second >= first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_follows_paused_tokio_time() {
        let clock = SystemClock::new();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(clock.elapsed() >= Duration::from_secs(3));
    }
}
