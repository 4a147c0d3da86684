use rust_decimal::Decimal;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Customer id must not be empty")]
    EmptyCustomerId,

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Item sku must not be empty")]
    EmptySku,

    #[error("Invalid item quantity for {sku}: must be greater than zero")]
    InvalidQuantity { sku: String },

    #[error("Invalid item price for {sku}: {price} is negative")]
    InvalidPrice { sku: String, price: Decimal },

    #[error("Order total overflows at item {sku}")]
    TotalOverflow { sku: String },

    #[error("Invalid status: {0:?}")]
    InvalidStatus(String),

    #[error("Transition from {from} to {to} is not allowed")]
    TransitionNotAllowed { from: OrderStatus, to: OrderStatus },
}
