use std::future::Future;
use std::time::Duration;

/// A bounded call ran out of time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{operation} timed out after {after:?}")]
pub struct Elapsed {
    pub operation: &'static str,
    pub after: Duration,
}

/// Await `future` for at most `after`.
pub async fn with_timeout<F: Future>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| Elapsed { operation, after })
}
