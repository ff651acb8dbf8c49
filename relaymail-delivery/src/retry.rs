//! Retry schedule for establishing outbound connections.
//!
//! After failed attempt `i` (1-indexed) the caller sleeps `i * step` before
//! trying again. Only temporary failures are retried; the caller's task is
//! held for the whole schedule.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DeliveryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step in seconds.
    #[serde(default = "defaults::backoff_step_secs")]
    pub backoff_step_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff_step_secs: defaults::backoff_step_secs(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay after the given failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_step_secs.saturating_mul(u64::from(attempt)))
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Run `operation` until it succeeds, fails with a non-temporary error, or
    /// the attempts run out.
    ///
    /// `operation` receives the 1-indexed attempt number.
    ///
    /// # Errors
    ///
    /// Non-temporary errors are returned as-is. Running out of attempts
    /// yields [`DeliveryError::Exhausted`] wrapping the last failure.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, DeliveryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_temporary() => return Err(error),
                Err(error) if attempt >= attempts => {
                    return Err(DeliveryError::Exhausted {
                        attempts,
                        cause: Box::new(error),
                    });
                }
                Err(error) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_secs = delay.as_secs(),
                        %error,
                        "Delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn backoff_step_secs() -> u64 {
        2
    }
}
