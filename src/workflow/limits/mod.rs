// Admission limits applied before an ingestion run starts


use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::{RagError, Result, config::WorkflowConfig};

/// Drop timestamps that fell out of the sliding window ending at `now`
fn prune(window: &mut VecDeque<Instant>, period: Duration, now: Instant) {
    while window
        .front()
        .is_some_and(|&started| now.duration_since(started) >= period)
    {
        window.pop_front();
    }
}

/// Bounds how many runs may start per period. Runs over the limit wait for a
/// free slot instead of failing.
#[derive(Debug)]
pub struct Throttle {
    limit: usize,
    period: Duration,
    starts: tokio::sync::Mutex<VecDeque<Instant>>,
}

impl Throttle {
    /// A `limit` of zero disables throttling
    #[inline]
    pub fn new(limit: usize, period: Duration) -> Self {
        Self {
            limit,
            period,
            starts: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    #[inline]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.throttle_limit, config.throttle_period())
    }

    /// Wait until a run may start and record its start
    #[inline]
    pub async fn acquire(&self) {
        if self.limit == 0 {
            return;
        }

        loop {
            // Holding the lock while sleeping keeps waiters in arrival order
            let mut starts = self.starts.lock().await;
            let now = Instant::now();
            prune(&mut starts, self.period, now);

            if starts.len() < self.limit {
                starts.push_back(now);
                return;
            }

            let Some(&oldest) = starts.front() else {
                continue;
            };
            let wait = self.period.saturating_sub(now.duration_since(oldest));
            info!("Throttled, waiting {:?} for a free slot", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Bounds how many runs may start per key per period. Runs over the limit
/// are rejected with [`RagError::RateLimited`].
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    period: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// A `limit` of zero disables rate limiting
    #[inline]
    pub fn new(limit: usize, period: Duration) -> Self {
        Self {
            limit,
            period,
            hits: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.rate_limit_per_source, config.rate_limit_period())
    }

    /// Record a run for `key` if it is within the limit
    #[inline]
    pub fn try_acquire(&self, key: &str) -> Result<()> {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> Result<()> {
        if self.limit == 0 {
            return Ok(());
        }

        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.retain(|_, window| {
            prune(window, self.period, now);
            !window.is_empty()
        });

        let window = hits.entry(key.to_string()).or_default();
        if window.len() >= self.limit {
            debug!("Rate limit reached for {}", key);
            return Err(RagError::RateLimited {
                key: key.to_string(),
            });
        }

        window.push_back(now);
        Ok(())
    }
}
