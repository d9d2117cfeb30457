//! Poll-until-stable primitive.
//!
//! Every blocking wait in a collection run goes through here: first-page
//! readiness and page-transition confirmation. Waits are always bounded.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// The predicate never held before the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutExceeded<T> {
    /// The value seen on the final poll.
    pub last: T,
    pub waited: Duration,
    pub polls: u32,
}

/// Bounded polling configuration.
#[derive(Debug, Clone, Copy)]
pub struct StabilityWaiter {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl StabilityWaiter {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Poll `observe` until `predicate` accepts its value or the timeout
    /// elapses.
    ///
    /// `observe` runs at least once, so a zero timeout still gets one look.
    pub async fn wait_until<T, F, Fut, P>(
        &self,
        mut observe: F,
        mut predicate: P,
    ) -> Result<T, TimeoutExceeded<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        P: FnMut(&T) -> bool,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut polls = 0u32;

        loop {
            let value = observe().await;
            polls += 1;

            if predicate(&value) {
                return Ok(value);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TimeoutExceeded {
                    last: value,
                    waited: now - started,
                    polls,
                });
            }

            let pause = self.poll_interval.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
