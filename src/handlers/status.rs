use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::StatusCache;
use crate::dispatch::TypedHandler;
use crate::domain::OrderStatus;
use crate::messaging::OrderStatusChanged;
use crate::store::OrderStore;

// ============================================================================
// Status Reconciler
// ============================================================================
//
// Consumes the downstream status stream and applies the guarded transition:
// the update lands only while the row is still PROCESSING. Duplicate and
// out-of-order deliveries for the same order therefore collapse into no-ops,
// and two terminal states can never both win.
//
// ============================================================================

/// Total mapping from the downstream status vocabulary into the internal set.
/// FAILED is the catch-all; unknown codes are never an error.
pub fn map_external_status(code: &str) -> OrderStatus {
    match code {
        "SUCCESS" | "CONFIRMED" => OrderStatus::Confirmed,
        _ => OrderStatus::Failed,
    }
}

pub struct StatusReconciler {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn StatusCache>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn StatusCache>) -> Self {
        Self { store, cache }
    }
}

#[async_trait]
impl TypedHandler<OrderStatusChanged> for StatusReconciler {
    async fn handle(&self, msg: OrderStatusChanged) -> anyhow::Result<()> {
        let to = map_external_status(&msg.status);

        let changed = self
            .store
            .update_status_if(msg.order_id, OrderStatus::Processing, to)
            .await?;

        if !changed {
            // Already reconciled or unknown id; safe to drop under
            // at-least-once delivery.
            tracing::debug!(
                order_id = %msg.order_id,
                external_status = %msg.status,
                "guarded transition skipped"
            );
            return Ok(());
        }

        tracing::info!(
            order_id = %msg.order_id,
            status = %to,
            "order reconciled"
        );

        if let Err(err) = self.cache.set_status(msg.order_id, to).await {
            tracing::warn!(
                order_id = %msg.order_id,
                error = %err,
                "status cache refresh failed"
            );
        }
        Ok(())
    }
}
