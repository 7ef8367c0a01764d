// crates/jobs/src/clock.rs
//! Wall-clock sources for staleness checks.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of "now" for comparing against a job's `updated_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that advances with tokio's clock from a fixed starting point.
///
/// Under `tokio::time::pause()` it moves only when the runtime's time is
/// advanced, so timer-driven tests see consistent staleness arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}
