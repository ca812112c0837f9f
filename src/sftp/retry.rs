//! SFTP operation retry logic
//!
//! Operation-level failures on an open channel are retried in place, on the
//! same channel, until the attempt budget runs out. Connection failures never
//! reach this loop; the executor handles those.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::error::SftpError;
use super::ops::SftpOp;
use crate::ssh::SftpChannel;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, the first one included
    pub max_attempts: usize,

    /// Delay before the first retry in milliseconds (0 retries immediately)
    pub initial_backoff_ms: u64,

    /// Backoff multiplier for each further retry
    pub backoff_multiplier: f64,

    /// Maximum backoff in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff_ms: 0,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with the given attempt budget and no backoff
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set custom backoff parameters
    pub fn with_backoff(mut self, initial_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.backoff_multiplier = multiplier;
        self.max_backoff_ms = max_ms;
        self
    }
}

/// Delay before retry number `retry` (0-based), growing exponentially.
pub fn calculate_backoff(retry: usize, config: &RetryConfig) -> Duration {
    let delay_ms = (config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(retry as i32))
        .min(config.max_backoff_ms as f64);

    Duration::from_millis(delay_ms as u64)
}

/// Local filesystem failures are not channel failures, so they are final.
pub fn is_retryable_error(error: &SftpError) -> bool {
    !matches!(error, SftpError::LocalIo(_))
}

/// Per-operation attempt bookkeeping.
#[derive(Debug)]
struct RetryState {
    attempts_remaining: usize,
    last_error: Option<SftpError>,
}

/// Run `op` on `channel` until it succeeds or the budget is exhausted.
///
/// Returns the last captured error when every attempt failed.
pub async fn run_with_retry<O>(
    op: &mut O,
    channel: &mut dyn SftpChannel,
    config: &RetryConfig,
) -> Result<O::Output, SftpError>
where
    O: SftpOp + ?Sized,
{
    let budget = config.max_attempts.max(1);
    let mut state = RetryState {
        attempts_remaining: budget,
        last_error: None,
    };

    while state.attempts_remaining > 0 {
        let attempt = budget - state.attempts_remaining;
        if attempt > 0 {
            let delay = calculate_backoff(attempt - 1, config);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        match op.run(channel).await {
            Ok(output) => return Ok(output),
            Err(e) if !is_retryable_error(&e) => {
                warn!("{} failed with non-retryable error: {}", op.name(), e);
                return Err(e);
            }
            Err(e) => {
                state.attempts_remaining -= 1;
                warn!(
                    "{} failed (attempt {}/{}), {}: {}",
                    op.name(),
                    attempt + 1,
                    budget,
                    if state.attempts_remaining > 0 { "retrying" } else { "giving up" },
                    e
                );
                state.last_error = Some(e);
            }
        }
    }

    match state.last_error {
        Some(e) => {
            error!("{} failed after {} attempts: {}", op.name(), budget, e);
            Err(e)
        }
        None => Err(SftpError::TransferError(format!(
            "{} made no attempts",
            op.name()
        ))),
    }
}
