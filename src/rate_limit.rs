//! Sliding-window rate limiter for outbound calls.
//!
//! Admits at most `capacity` calls in any trailing window (60 seconds by
//! default). [`RateLimiter::acquire`] never fails; when the window is full
//! it sleeps until the oldest admitted call leaves the window.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitUsage {
    pub current_requests: usize,
    pub max_requests: usize,
}

pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    /// Held by `acquire` for its whole wait, so waiters queue in order.
    admission: Mutex<()>,
    /// Admission times, oldest first. Only ever locked briefly.
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limit to `requests_per_minute` calls per 60 seconds.
    pub fn new(requests_per_minute: usize) -> Self {
        Self::with_window(requests_per_minute, DEFAULT_WINDOW)
    }

    pub fn with_window(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            admission: Mutex::new(()),
            requests: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a slot, record the admission, and return how long we waited.
    ///
    /// Concurrent callers are admitted one at a time, in arrival order.
    /// [`usage`](Self::usage) never waits behind a sleeping caller.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let _turn = self.admission.lock().await;

        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();
                purge(&mut requests, now, self.window);

                if requests.len() < self.capacity {
                    requests.push_back(now);
                    break;
                }
                match requests.front() {
                    Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                    None => continue,
                }
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                capacity = self.capacity,
                "rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }

        started.elapsed()
    }

    /// Admissions inside the current window. Prunes expired entries.
    pub async fn usage(&self) -> RateLimitUsage {
        let mut requests = self.requests.lock().await;
        purge(&mut requests, Instant::now(), self.window);
        RateLimitUsage {
            current_requests: requests.len(),
            max_requests: self.capacity,
        }
    }

    /// `(remaining, max)` for the current window. Prunes expired entries.
    pub async fn remaining_capacity(&self) -> (usize, usize) {
        let usage = self.usage().await;
        (
            usage.max_requests.saturating_sub(usage.current_requests),
            usage.max_requests,
        )
    }
}

/// Drop admissions that are at least one window old.
fn purge(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = requests.front() {
        if now.duration_since(front) >= window {
            requests.pop_front();
        } else {
            break;
        }
    }
}
