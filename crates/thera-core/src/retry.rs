//! Retry logic with exponential backoff and optional jitter.

use std::time::Duration;

use crate::http_client::{HttpError, HttpErrorKind};

/// Wait between attempts of one upstream call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `base * factor^n`, capped at `max`; `jitter` spreads it by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    /// 4 s, then 8 s, never more than 10 s.
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(4),
            factor: 2.0,
            max: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt`, counting from 0.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let uncapped = base.as_secs_f64() * factor.powi(exponent);
                let delay = Duration::from_secs_f64(uncapped.min(max.as_secs_f64()).max(0.0));
                if !jitter {
                    return delay;
                }

                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let half = millis / 2;
                Duration::from_millis(half.saturating_add(fastrand::u64(0..=millis)))
            }
        }
    }
}

/// Which transport failures are retried, how often, and how long to wait.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Attempts beyond the first.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_timeout: bool,
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    /// Three attempts in total.
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            backoff: Backoff::default(),
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    /// Constant `delay` between at most `max_retries` retries.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Whether a failed attempt (1-based `attempt`) should be retried.
    pub fn should_retry(&self, error: &HttpError, attempt: u32) -> bool {
        if attempt >= self.max_attempts() {
            return false;
        }
        match error.kind() {
            HttpErrorKind::Timeout => self.retry_on_timeout,
            HttpErrorKind::Connect => self.retry_on_connect,
            HttpErrorKind::Other => false,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
