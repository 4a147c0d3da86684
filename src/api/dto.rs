use serde::Deserialize;

use crate::domain::order::{OrderItem, OrderStatus};
use crate::store::OrderFilter;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilterQuery {
    pub status: Option<String>,
    pub customer_id: Option<String>,
}

impl TryFrom<OrderFilterQuery> for OrderFilter {
    type Error = ApiError;

    fn try_from(query: OrderFilterQuery) -> Result<Self, Self::Error> {
        let status = query
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<OrderStatus>())
            .transpose()
            .map_err(|e| ApiError::bad_request("invalid_status", e.to_string()))?;

        Ok(OrderFilter {
            status,
            customer_id: query.customer_id.filter(|c| !c.is_empty()),
        })
    }
}
