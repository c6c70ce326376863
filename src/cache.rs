use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::OrderStatus;
use crate::error::RelayError;
use crate::utils::bounded;

/// Read-through status cache. Strictly best-effort: callers log and swallow
/// failures, they never surface them.
#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn set_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), RelayError>;

    async fn get_status(&self, order_id: Uuid) -> Result<Option<OrderStatus>, RelayError>;
}

pub struct RedisStatusCache {
    conn: MultiplexedConnection,
    /// Zero means no expiry.
    ttl: Duration,
    call_timeout: Duration,
}

impl RedisStatusCache {
    pub fn new(conn: MultiplexedConnection, ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            conn,
            ttl,
            call_timeout,
        }
    }
}

fn status_key(order_id: Uuid) -> String {
    format!("order:status:{order_id}")
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn set_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(status_key(order_id)).arg(status.as_str());
        if !self.ttl.is_zero() {
            cmd.arg("EX").arg(self.ttl.as_secs());
        }
        bounded(self.call_timeout, "status cache set", async move {
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get_status(&self, order_id: Uuid) -> Result<Option<OrderStatus>, RelayError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = bounded(self.call_timeout, "status cache get", async move {
            let value = redis::cmd("GET")
                .arg(status_key(order_id))
                .query_async(&mut conn)
                .await?;
            Ok(value)
        })
        .await?;
        Ok(value.as_deref().and_then(OrderStatus::parse))
    }
}
