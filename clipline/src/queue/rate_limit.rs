//! Admission rate limiter.
//!
//! Two sliding windows: a one-minute request window and a short burst window.
//! A request is admitted only when both have room.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::{Error, Result};

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    minute_window: VecDeque<Instant>,
    burst_window: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            minute_window: VecDeque::new(),
            burst_window: VecDeque::new(),
        }
    }

    /// Record a request if both windows allow it.
    ///
    /// A denial carries the retry delay in `Error::RateLimited`.
    pub fn try_acquire(&mut self) -> Result<()> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let burst_window = Duration::from_millis(self.config.burst_window_ms);
        evict_older_than(&mut self.minute_window, now, MINUTE);
        evict_older_than(&mut self.burst_window, now, burst_window);

        if self.minute_window.len() >= self.config.requests_per_minute as usize
            || self.burst_window.len() >= self.config.burst_limit as usize
        {
            return Err(Error::RateLimited {
                retry_after_ms: self.config.retry_delay_ms,
            });
        }

        self.minute_window.push_back(now);
        self.burst_window.push_back(now);
        Ok(())
    }

    /// Requests counted in the current minute window.
    pub fn current_minute_count(&self) -> usize {
        self.minute_window.len()
    }
}

fn evict_older_than(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}
