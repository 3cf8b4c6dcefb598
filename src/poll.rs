//! Poll-sleep waits on tokio's clock.
//!
//! Every blocking point of a run goes through here, so a paused tokio clock
//! (`#[tokio::test(start_paused = true)]`) simulates whole runs without real delays.

use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in time after which a stage has failed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Run `check` every `interval` until it yields a value or `timeout` elapses.
///
/// The check always runs at least once, and once more at the deadline, so a
/// zero timeout still checks the current state.
pub async fn wait_until<T, F>(interval: Duration, timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let deadline = Deadline::after(timeout);
    loop {
        if let Some(v) = check() {
            return Some(v);
        }
        if deadline.expired() {
            return None;
        }
        tokio::time::sleep(interval.min(deadline.remaining())).await;
    }
}
