// crates/jobs/src/timer.rs
//! Cancellable deadlines for the tracker's select loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// A single-shot deadline that can be armed, re-armed and disarmed.
///
/// A disarmed deadline's [`Deadline::expired`] future never resolves, so it
/// can sit in a `tokio::select!` branch unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn disarmed() -> Self {
        Self { at: None }
    }

    /// Fire `after` from now, replacing any earlier schedule. A duration
    /// too large to represent leaves the deadline disarmed: it never fires.
    pub fn arm(&mut self, after: Duration) {
        self.at = Instant::now().checked_add(after);
        if self.at.is_none() {
            tracing::debug!(after_secs = after.as_secs(), "deadline beyond representable time; never fires");
        }
    }

    pub fn disarm(&mut self) {
        self.at = None;
    }

    /// Resolves when the deadline passes. Owns a copy of the schedule, so
    /// re-arming after creating the future does not affect it.
    pub fn expired(&self) -> impl Future<Output = ()> + Send + 'static {
        let at = self.at;
        async move {
            match at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        }
    }
}
