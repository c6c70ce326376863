use async_trait::async_trait;
use std::sync::Arc;

use crate::dispatch::TypedHandler;
use crate::gateway::OrderGateway;
use crate::messaging::OrderCreated;

/// Forwards created events to the downstream fulfillment service.
///
/// Single responsibility: call the gateway. Errors bubble to the dispatcher,
/// which nacks with the queue's requeue policy; the downstream create must be
/// idempotent under redelivery.
pub struct OrderCreatedHandler {
    gateway: Arc<dyn OrderGateway>,
}

impl OrderCreatedHandler {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TypedHandler<OrderCreated> for OrderCreatedHandler {
    async fn handle(&self, msg: OrderCreated) -> anyhow::Result<()> {
        self.gateway
            .create_order(msg.order_id, &msg.user_id, msg.cents, &msg.currency)
            .await
    }
}
