//! Bounded retry with fixed inter-attempt delay.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{OratorError, Result};

/// Parameterized retry policy. Stateless across calls: every `run` starts
/// its attempt counter at zero.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent. Success
    /// short-circuits; the terminal error embeds the last underlying cause.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(target: "retry", label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt >= self.max_attempts => {
                    error!(
                        target: "retry",
                        label,
                        attempts = attempt,
                        error = %err,
                        "retry budget exhausted"
                    );
                    return Err(OratorError::SynthesisExhausted {
                        attempts: attempt,
                        cause: Box::new(err),
                    });
                }
                Err(err) => {
                    warn!(
                        target: "retry",
                        label,
                        attempt,
                        error = %err,
                        "attempt failed; retrying"
                    );
                    sleep(self.delay).await;
                }
            }
        }
    }
}
