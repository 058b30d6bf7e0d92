//! Cooperative cancellation for network calls
//!
//! Every call that touches the Hub or the cluster goes through [`with_cancel`]
//! so an external deadline aborts the in-flight request instead of waiting
//! for it to finish.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// Run `fut` unless `cancel` fires first.
///
/// Returns [`Error::Cancelled`] naming `operation` when the token wins.
pub async fn with_cancel<T, Fut>(cancel: &CancellationToken, operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::cancelled(operation));
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(operation = %operation, "Cancelled while in flight");
            Err(Error::cancelled(operation))
        }
        result = fut => result,
    }
}
