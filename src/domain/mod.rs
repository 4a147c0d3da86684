// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Pure order rules: validation, status transitions and the change event.
// Nothing here performs I/O; adapters and orchestration live elsewhere.
//
// ============================================================================

pub mod order;
