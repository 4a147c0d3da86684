// ============================================================================
// Order Lifecycle - orchestration across store, cache and broker
// ============================================================================
//
// create        -> store insert
// get_by_id     -> cache, then store on miss, then cache put
// get_filtered  -> store only
// update_status -> store read, validate, store write, cache invalidate,
//                  event publish (serialized per order id)
//
// The store is the source of truth. The cache is disposable and the broker
// is told after the fact.
//
// ============================================================================

mod errors;
mod keyed_lock;
mod service;

pub use errors::LifecycleError;
pub use service::{LifecycleConfig, OrderLifecycle};
