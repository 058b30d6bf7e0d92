//! Bounded polling for long-running operations.
//!
//! [`wait_until_done`] repeatedly invokes a poll function at a fixed interval.
//! The retry decision is driven entirely by the error type: anything marked
//! [`Error::Unrecoverable`] (or a cancellation) stops the loop at once, every
//! other error just consumes an attempt. A permanent rejection from the Hub
//! therefore surfaces immediately instead of after the full attempt budget.
//!
//! # Example
//!
//! ```ignore
//! use membership_common::{wait_until_done, RetryPolicy};
//!
//! wait_until_done(&RetryPolicy::default(), "create membership", &cancel, || {
//!     hub.check_operation(&operation_name)
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Default number of poll attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Default interval between poll attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How many times, and how often, to poll an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of poll attempts (at least one attempt is always made)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and interval
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Poll until `poll` reports done.
///
/// `poll` returns `Ok(true)` once the operation is done and `Ok(false)` while
/// it is still running. Errors are retried unless they are unrecoverable.
///
/// Never calls `poll` more than `policy.max_attempts` times. Fails with
/// [`Error::Timeout`] once the budget is spent and with [`Error::Cancelled`]
/// as soon as `cancel` fires, including while sleeping between attempts.
pub async fn wait_until_done<F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    mut poll: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let outcome = crate::with_cancel(cancel, operation, poll()).await;
        match outcome {
            Ok(true) => {
                debug!(operation = %operation, attempt, "Operation done");
                return Ok(());
            }
            Ok(false) => {
                debug!(operation = %operation, attempt, "Operation not done yet");
            }
            Err(e) if e.is_unrecoverable() => {
                warn!(operation = %operation, attempt, error = %e, "Polling stopped");
                return Err(e);
            }
            Err(e) => {
                debug!(operation = %operation, attempt, error = %e, "Poll failed, retrying");
            }
        }

        if attempt < max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::cancelled(operation)),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    warn!(operation = %operation, attempts = max_attempts, "Poll attempts exhausted");
    Err(Error::timeout(operation, max_attempts))
}
