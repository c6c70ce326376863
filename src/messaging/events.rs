use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Wire Events
// ============================================================================
//
// JSON messages crossing the broker. Produced exactly once per persisted
// order, consumed at least once; handlers must tolerate redelivery.
//
// ============================================================================

/// Published after an order row is persisted; drives downstream fulfillment.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub user_id: String,
    pub cents: i64,
    pub currency: String,
}

/// Emitted by the downstream system when it finishes (or rejects) an order.
/// No ordering guarantee, not even for events about the same order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub user_id: String,
    pub cents: i64,
    pub currency: String,
    /// External vocabulary, e.g. "SUCCESS"; mapped to the internal status set
    /// by the reconciler.
    pub status: String,
}
