use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderId, OrderStatus};

// ============================================================================
// Order Events - emitted on status transitions, never stored
// ============================================================================

/// Published on `orders.events`, keyed by order id.
///
/// `timestamp` is the time of the transition (the order's new `updated_at`),
/// not the time of the publish attempt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    pub order_id: OrderId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl StatusChangeEvent {
    pub fn event_type(&self) -> &'static str {
        "OrderStatusChanged"
    }
}

/// `yyyy-MM-ddTHH:mm:ssZ`, always UTC, second precision.
mod wire_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
