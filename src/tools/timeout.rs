//! Execution Timeout Management
//!
//! This module provides the timer that races against process completion.

use crate::policy::DEFAULT_COMMAND_TIMEOUT_SECS;
use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Returned when the timer fires before the future completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("execution timed out after {0:?}")]
pub struct TimeoutExpired(pub Duration);

/// Execution timeout configuration
///
/// Timeouts are enforced to prevent commands from hanging indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    /// The timeout duration
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)
    }
}

impl ExecutionTimeout {
    /// Create a new execution timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use cmdguard_server::tools::ExecutionTimeout;
    ///
    /// let timeout = ExecutionTimeout::new(Duration::from_secs(30));
    /// assert_eq!(timeout.duration(), Duration::from_secs(30));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `future` until it completes or the timer fires
    ///
    /// On expiry the future is dropped before this returns, so any resources
    /// it borrowed are released.
    pub async fn run<F, T>(&self, future: F) -> Result<T, TimeoutExpired>
    where
        F: Future<Output = T>,
    {
        time::timeout(self.duration, future)
            .await
            .map_err(|_| TimeoutExpired(self.duration))
    }
}
