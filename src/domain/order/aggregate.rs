use chrono::{DateTime, Duration, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::events::StatusChangeEvent;
use super::value_objects::{OrderId, OrderItem, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub customer_id: String,

    // Current State
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which status changes `Order::transition_to` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may follow any other.
    #[default]
    Unrestricted,
    /// Delivered and cancelled orders refuse further transitions.
    TerminalLocked,
}

impl TransitionPolicy {
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        match self {
            TransitionPolicy::Unrestricted => Ok(()),
            TransitionPolicy::TerminalLocked if from.is_terminal() => {
                Err(OrderError::TransitionNotAllowed { from, to })
            }
            TransitionPolicy::TerminalLocked => Ok(()),
        }
    }
}

impl Order {
    /// Build a fresh order in status NEW.
    ///
    /// Timestamps are truncated to milliseconds so the in-memory value equals
    /// what the store hands back.
    pub fn new(
        customer_id: impl Into<String>,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let customer_id = customer_id.into();
        if customer_id.trim().is_empty() {
            return Err(OrderError::EmptyCustomerId);
        }
        Self::validate_items(&items)?;

        let now = now.trunc_subsecs(3);
        Ok(Self {
            id: OrderId::generate(),
            customer_id,
            status: OrderStatus::New,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a status change and describe it as an event.
    ///
    /// `updated_at` always moves strictly forward, even if the clock did not.
    pub fn transition_to(&mut self, new_status: OrderStatus, now: DateTime<Utc>) -> StatusChangeEvent {
        let old_status = self.status;
        let next = now.trunc_subsecs(3).max(self.updated_at + Duration::milliseconds(1));

        self.status = new_status;
        self.updated_at = next;

        StatusChangeEvent {
            order_id: self.id.clone(),
            old_status,
            new_status,
            timestamp: next,
        }
    }

    /// Monotonic cache version for this state of the order.
    pub fn version(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }

    /// Sum of price times quantity. `None` only if it does not fit a `Decimal`,
    /// which `Order::new` already rejects.
    pub fn total(&self) -> Option<Decimal> {
        Self::checked_total(&self.items).ok()
    }

    fn checked_total(items: &[OrderItem]) -> Result<Decimal, OrderError> {
        items.iter().try_fold(Decimal::ZERO, |total, item| {
            item.unit_price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| OrderError::TotalOverflow { sku: item.sku.clone() })
        })
    }

    fn validate_items(items: &[OrderItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        for item in items {
            if item.sku.trim().is_empty() {
                return Err(OrderError::EmptySku);
            }
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity { sku: item.sku.clone() });
            }
            if item.unit_price < Decimal::ZERO {
                return Err(OrderError::InvalidPrice {
                    sku: item.sku.clone(),
                    price: item.unit_price,
                });
            }
        }

        Self::checked_total(items).map(|_| ())
    }
}
