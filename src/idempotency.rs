use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

use crate::error::RelayError;
use crate::utils::bounded;

// ============================================================================
// Idempotency Gate
// ============================================================================
//
// Distributed lock + recall keyed by (scope, key), where scope is the caller
// identity and key is the caller-supplied idempotency token.
//
// Two entries per token, with independent TTLs:
// - lock:  short-lived, exists only to serialize concurrent attempts
// - map:   durable (scope, key) -> order id mapping, so a recall can succeed
//          long after the lock has expired
//
// ============================================================================

#[async_trait]
pub trait IdempotencyGate: Send + Sync {
    /// Atomic set-if-absent. Returns true only to the single caller that wins
    /// the race; everyone else (including retries before the lock expires)
    /// gets false.
    async fn try_lock(&self, scope: &str, key: &str) -> Result<bool, RelayError>;

    /// Record the durable (scope, key) -> order id mapping. Best-effort for
    /// callers: losing it only risks a future duplicate, never bad data.
    async fn remember(&self, scope: &str, key: &str, order_id: &str) -> Result<(), RelayError>;

    /// Non-mutating lookup. `None` is not an error; it means "proceed as
    /// first attempt".
    async fn recall(&self, scope: &str, key: &str) -> Result<Option<String>, RelayError>;
}

pub struct RedisIdempotencyGate {
    conn: MultiplexedConnection,
    lock_ttl: Duration,
    map_ttl: Duration,
    /// Per-command deadline; a stalled Redis must not hang intake.
    call_timeout: Duration,
}

impl RedisIdempotencyGate {
    pub fn new(
        conn: MultiplexedConnection,
        lock_ttl: Duration,
        map_ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            lock_ttl,
            map_ttl,
            call_timeout,
        }
    }
}

fn lock_key(scope: &str, key: &str) -> String {
    format!("idem:lock:{scope}:{key}")
}

fn map_key(scope: &str, key: &str) -> String {
    format!("idem:map:{scope}:{key}")
}

#[async_trait]
impl IdempotencyGate for RedisIdempotencyGate {
    async fn try_lock(&self, scope: &str, key: &str) -> Result<bool, RelayError> {
        let mut conn = self.conn.clone();
        let ttl = self.lock_ttl.as_secs().max(1);
        let key = lock_key(scope, key);
        // SET NX EX is a single atomic operation; no read-then-write window.
        let reply: Option<String> = bounded(self.call_timeout, "idempotency try_lock", async move {
            let value = redis::cmd("SET")
                .arg(key)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(ttl)
                .query_async(&mut conn)
                .await?;
            Ok(value)
        })
        .await?;
        Ok(reply.is_some())
    }

    async fn remember(&self, scope: &str, key: &str, order_id: &str) -> Result<(), RelayError> {
        let mut conn = self.conn.clone();
        let ttl = self.map_ttl.as_secs().max(1);
        let key = map_key(scope, key);
        let order_id = order_id.to_string();
        bounded(self.call_timeout, "idempotency remember", async move {
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(order_id)
                .arg("EX")
                .arg(ttl)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn recall(&self, scope: &str, key: &str) -> Result<Option<String>, RelayError> {
        let mut conn = self.conn.clone();
        let key = map_key(scope, key);
        bounded(self.call_timeout, "idempotency recall", async move {
            let value = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }
}
