use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::RelayError;
use crate::messaging::OrderCreated;
use crate::utils::{with_backoff, BackoffConfig};

/// Port to the downstream fulfillment service, invoked from the queue handler
/// for created events. The orchestrator never calls it directly.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(
        &self,
        order_id: Uuid,
        user_id: &str,
        cents: i64,
        currency: &str,
    ) -> anyhow::Result<()>;
}

pub struct HttpOrderGateway {
    http: reqwest::Client,
    base_url: String,
    backoff: BackoffConfig,
}

impl HttpOrderGateway {
    pub fn new(base_url: impl Into<String>, call_timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .user_agent("order-relay/worker")
            .build()?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            http,
            base_url,
            backoff: BackoffConfig::default(),
        })
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn create_order(
        &self,
        order_id: Uuid,
        user_id: &str,
        cents: i64,
        currency: &str,
    ) -> anyhow::Result<()> {
        let payload = OrderCreated {
            order_id,
            user_id: user_id.to_string(),
            cents,
            currency: currency.to_string(),
        };
        let url = format!("{}/orders", self.base_url);

        with_backoff(&self.backoff, |_| {
            let request = self.http.post(&url).json(&payload);
            async move {
                let response = request.send().await?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    anyhow::bail!("downstream rejected order: {}", response.status())
                }
            }
        })
        .await
    }
}
