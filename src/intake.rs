use std::sync::Arc;
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::domain::{validate_fields, Money, Order, OrderStatus};
use crate::error::RelayError;
use crate::idempotency::IdempotencyGate;
use crate::messaging::{CreatedEventPublisher, OrderCreated};
use crate::store::OrderStore;

// ============================================================================
// Order Intake Orchestrator
// ============================================================================
//
// The synchronous entry point. Correctness-gating steps (recall, lock,
// persist, publish) abort on transient failure; cache refresh and remember
// are best-effort and only ever logged.
//
// A publish failure after the row is persisted is surfaced to the caller with
// no compensation; recovery of orphaned PROCESSING rows belongs to a separate
// reconciliation job.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct CreateOrderInput {
    pub user_id: String,
    /// Absent key disables the idempotency gate for this request.
    pub idempotency_key: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub items_json: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateOrderOutput {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

pub struct CreateOrder {
    store: Arc<dyn OrderStore>,
    gate: Arc<dyn IdempotencyGate>,
    cache: Arc<dyn StatusCache>,
    publisher: Arc<dyn CreatedEventPublisher>,
}

impl CreateOrder {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gate: Arc<dyn IdempotencyGate>,
        cache: Arc<dyn StatusCache>,
        publisher: Arc<dyn CreatedEventPublisher>,
    ) -> Self {
        Self {
            store,
            gate,
            cache,
            publisher,
        }
    }

    pub async fn execute(&self, input: CreateOrderInput) -> Result<CreateOrderOutput, RelayError> {
        // Reject bad input before touching the gate or the store. Same
        // invariant the persisted row carries, checked once, in the domain.
        let amount = Money {
            cents: input.amount_cents,
            currency: input.currency,
        };
        validate_fields(&input.user_id, &amount, &input.items_json)?;

        let idem_key = input
            .idempotency_key
            .as_deref()
            .filter(|key| !key.is_empty());

        // Fast path: a retried request with a remembered key returns the same
        // identity without doing any new work. The in-flight status is always
        // PROCESSING from the synchronous path's point of view.
        if let Some(key) = idem_key {
            if let Some(prior) = self.gate.recall(&input.user_id, key).await? {
                let order_id = Uuid::parse_str(&prior).map_err(|e| {
                    RelayError::transient(
                        anyhow::Error::new(e).context("corrupt idempotency mapping"),
                    )
                })?;
                tracing::info!(
                    user_id = %input.user_id,
                    order_id = %order_id,
                    "idempotent replay"
                );
                return Ok(CreateOrderOutput {
                    order_id,
                    status: OrderStatus::Processing,
                });
            }

            if !self.gate.try_lock(&input.user_id, key).await? {
                // A concurrent attempt with the same key is in flight:
                // conflict, not a server error.
                return Err(RelayError::Duplicate);
            }
        }

        let order = Order {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            status: OrderStatus::Processing,
            amount,
            items_json: input.items_json,
            idempotency_key: idem_key.map(str::to_string),
        };

        // A persistence failure aborts everything; the lock is left to expire
        // naturally rather than being compensated.
        self.store.create(&order).await?;

        if let Err(err) = self.cache.set_status(order.id, order.status).await {
            tracing::warn!(order_id = %order.id, error = %err, "status cache set failed");
        }

        let event = OrderCreated {
            order_id: order.id,
            user_id: order.user_id.clone(),
            cents: order.amount.cents,
            currency: order.amount.currency.clone(),
        };
        self.publisher.publish_created(&event).await?;

        if let Some(key) = idem_key {
            if let Err(err) = self
                .gate
                .remember(&order.user_id, key, &order.id.to_string())
                .await
            {
                tracing::warn!(order_id = %order.id, error = %err, "idempotency remember failed");
            }
        }

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            cents = order.amount.cents,
            currency = %order.amount.currency,
            "order accepted"
        );

        Ok(CreateOrderOutput {
            order_id: order.id,
            status: OrderStatus::Processing,
        })
    }
}
