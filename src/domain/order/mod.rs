// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (OrderId, OrderItem, OrderStatus)
// - Events (StatusChangeEvent)
// - Errors (OrderError enum)
// - Aggregate (Order, TransitionPolicy)
//
// Persistence, caching and publishing live outside the domain.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod errors;
pub mod aggregate;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use errors::*;
pub use aggregate::*;
