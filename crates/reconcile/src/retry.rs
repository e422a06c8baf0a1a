//! Connection retries with exponential backoff
//!
//! Only errors that report themselves retryable (transport failures, 5xx,
//! 429) are attempted again; authentication failures give up at once.

use log::warn;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// How often and how patiently to retry a server connection
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first; 1 disables retries
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub base_delay: Duration,
    /// Growth of the wait per attempt
    pub backoff_factor: f64,
    /// Ceiling for any single wait
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Waits between consecutive attempts; one fewer than `max_attempts`
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.base_delay.min(self.max_delay),
            factor: self.backoff_factor.max(1.0),
            ceiling: self.max_delay,
            remaining: self.max_attempts.saturating_sub(1),
        }
    }
}

/// Iterator over backoff delays
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    factor: f64,
    ceiling: Duration,
    remaining: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        let grown = self.next.as_secs_f64() * self.factor;
        self.next = Duration::try_from_secs_f64(grown)
            .map_or(self.ceiling, |grown| grown.min(self.ceiling));
        Some(current)
    }
}

/// Run `connect` until it succeeds, fails permanently, or the attempts run out.
///
/// `on_retry` sees the failed attempt number (1-based), the error and the
/// wait before the next attempt. The last error is returned on exhaustion.
pub fn retry_connect<T>(
    config: &RetryConfig,
    mut on_retry: impl FnMut(u32, &Error, Duration),
    mut connect: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut delays = config.backoff();
    let mut attempt = 1;
    loop {
        let err = match connect() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        let Some(delay) = delays.next() else {
            return Err(err);
        };
        on_retry(attempt, &err, delay);
        thread::sleep(delay);
        attempt += 1;
    }
}

/// [`retry_connect`] that logs each retry for `server`
pub fn with_retry<T>(
    config: &RetryConfig,
    server: &str,
    connect: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = config.max_attempts.max(1);
    retry_connect(
        config,
        |attempt, err, delay| {
            warn!(
                "{server}: attempt {attempt}/{attempts} failed ({err}); retrying in {:.1}s",
                delay.as_secs_f64()
            );
        },
        connect,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> Error {
        Error::Connection {
            server: "rtc1".to_string(),
            message: "HTTP 503".to_string(),
            retryable: true,
        }
    }

    fn quick(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let delays: Vec<u64> = RetryConfig::new(6, Duration::from_secs(10), 3.0)
            .backoff()
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![10, 30, 60, 60, 60]);
    }

    #[test]
    fn test_backoff_with_huge_ceiling_saturates() {
        let config = RetryConfig {
            max_attempts: 4,
            base_delay: Duration::from_secs(u64::MAX / 2),
            backoff_factor: 1e12,
            max_delay: Duration::from_secs(u64::MAX),
        };
        let delays: Vec<Duration> = config.backoff().collect();
        assert_eq!(delays.len(), 3);
        assert_eq!(delays[0], Duration::from_secs(u64::MAX / 2));
        assert_eq!(delays[1], Duration::from_secs(u64::MAX));
        assert_eq!(delays[2], Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_single_attempt_has_no_backoff() {
        let single = RetryConfig::new(1, Duration::ZERO, 1.0);
        assert_eq!(single.backoff().count(), 0);
    }

    #[test]
    fn test_authentication_failure_not_retried() {
        let mut calls = 0;
        let result: Result<()> = retry_connect(
            &quick(4),
            |_, _, _| panic!("must not retry"),
            || {
                calls += 1;
                Err(Error::Connection {
                    server: "rtc1".to_string(),
                    message: "authentication rejected (HTTP 401)".to_string(),
                    retryable: false,
                })
            },
        );

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_transient_failures_then_success() {
        let mut calls = 0;
        let mut retried = Vec::new();
        let result = retry_connect(
            &quick(3),
            |attempt, _, _| retried.push(attempt),
            || {
                calls += 1;
                if calls < 3 { Err(transient()) } else { Ok("session") }
            },
        );

        assert_eq!(result.unwrap(), "session");
        assert_eq!(retried, vec![1, 2]);
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&quick(2), "rtc1", || {
            calls += 1;
            Err(transient())
        });

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls, 2);
    }
}
