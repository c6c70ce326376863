use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::RelayError;

// ============================================================================
// Order Domain Model
// ============================================================================
//
// The order row is mutated by exactly one writer role at a time:
// - the intake orchestrator creates it in Processing
// - the status reconciler moves it Processing -> Confirmed | Failed via a
//   guarded compare-and-swap
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    Confirmed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PROCESSING" => Some(OrderStatus::Processing),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "FAILED" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monetary amount in integer minor units plus ISO currency code.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Money {
    pub cents: i64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub status: OrderStatus,
    pub amount: Money,
    /// Opaque item payload; the pipeline never interprets it.
    pub items_json: String,
    pub idempotency_key: Option<String>,
}

impl Order {
    /// Invariant check: violating orders are never persisted.
    pub fn validate(&self) -> Result<(), RelayError> {
        validate_fields(&self.user_id, &self.amount, &self.items_json)
    }
}

/// The single source of the order invariant. The intake path calls this
/// before an order identity exists; `Order::validate` delegates here so the
/// two can never drift apart.
pub fn validate_fields(user_id: &str, amount: &Money, items_json: &str) -> Result<(), RelayError> {
    if user_id.is_empty() {
        return Err(RelayError::Validation("user_id must not be empty".into()));
    }
    if amount.cents <= 0 {
        return Err(RelayError::Validation(
            "amount must be strictly positive".into(),
        ));
    }
    if amount.currency.is_empty() {
        return Err(RelayError::Validation("currency must not be empty".into()));
    }
    if items_json.is_empty() {
        return Err(RelayError::Validation("items must not be empty".into()));
    }
    Ok(())
}
