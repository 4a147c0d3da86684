use std::time::Duration;

use crate::domain::order::{Order, OrderError, OrderId};
use crate::messaging::PublishError;
use crate::store::StoreError;
use crate::utils::{Elapsed, IsTransient};

/// Operation label of the status write in `Timeout` errors.
pub(super) const STORE_UPDATE: &str = "store.update";

// ============================================================================
// Lifecycle Errors - what callers of OrderLifecycle can see
// ============================================================================
//
// Cache failures never show up here; they degrade to cache misses.
//
// `Notification` is the one partial-success outcome: the store write
// committed, the status-change event was not handed to the broker. It carries
// the committed order so callers can reconcile instead of retrying.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Validation failed: {0}")]
    Validation(#[from] OrderError),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order id collision: {0}")]
    Conflict(OrderId),

    #[error(transparent)]
    Store(StoreError),

    #[error("Order {} changed to {} but the status-change event was not published: {source}", order.id, order.status)]
    Notification {
        order: Box<Order>,
        #[source]
        source: PublishError,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },
}

impl LifecycleError {
    /// Machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Validation(OrderError::InvalidStatus(_)) => "invalid_status",
            LifecycleError::Validation(OrderError::TransitionNotAllowed { .. }) => "transition_not_allowed",
            LifecycleError::Validation(_) => "validation_error",
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::Conflict(_) => "conflict",
            LifecycleError::Store(_) => "store_error",
            LifecycleError::Notification { .. } => "notification_failed",
            LifecycleError::Timeout { .. } => "timeout",
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// A timed-out status write is ambiguous (it may have landed), so it is
    /// never retryable. A retryable store error is only safe to repeat for
    /// reads: repeating `update_status` after an ambiguous failure can apply
    /// the transition twice.
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::Timeout { operation, .. } => *operation != STORE_UPDATE,
            LifecycleError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl IsTransient for LifecycleError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            StoreError::Conflict(id) => LifecycleError::Conflict(id),
            other => LifecycleError::Store(other),
        }
    }
}

impl From<Elapsed> for LifecycleError {
    fn from(elapsed: Elapsed) -> Self {
        LifecycleError::Timeout {
            operation: elapsed.operation,
            after: elapsed.after,
        }
    }
}
