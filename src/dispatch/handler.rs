use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use thiserror::Error;

// ============================================================================
// Delivery Handlers
// ============================================================================
//
// A handler processes one delivery body. It must be idempotent: the default
// requeue policy means it will see the same message again after any failure.
//
// ============================================================================

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The body does not decode into the expected schema. The dispatcher
    /// discards such deliveries without retry; they must never block a queue.
    #[error("poison message: {0}")]
    Poison(#[source] serde_json::Error),

    /// Business or transient-infrastructure failure. The dispatcher nacks
    /// with the configured requeue flag.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError>;
}

/// A handler for one decoded message type.
#[async_trait]
pub trait TypedHandler<M>: Send + Sync {
    async fn handle(&self, msg: M) -> anyhow::Result<()>;
}

/// Adapts a [`TypedHandler`] into a raw [`Handler`] by decoding the body as
/// JSON. Decode failures are classified as poison, everything else as failed.
pub struct JsonHandler<M, H> {
    inner: H,
    _msg: PhantomData<fn(M)>,
}

impl<M, H> JsonHandler<M, H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            _msg: PhantomData,
        }
    }
}

#[async_trait]
impl<M, H> Handler for JsonHandler<M, H>
where
    M: DeserializeOwned + Send + 'static,
    H: TypedHandler<M>,
{
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let msg: M = serde_json::from_slice(body).map_err(HandlerError::Poison)?;
        self.inner.handle(msg).await.map_err(HandlerError::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Deserialize)]
    struct Ping {
        n: u64,
    }

    struct CountingPing {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TypedHandler<Ping> for CountingPing {
        async fn handle(&self, msg: Ping) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if msg.n == 0 {
                anyhow::bail!("n must be positive");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn decodes_and_delegates() {
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = JsonHandler::new(CountingPing { seen: seen.clone() });

        handler.handle(br#"{"n": 1}"#).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_body_is_poison() {
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = JsonHandler::new(CountingPing { seen: seen.clone() });

        let err = handler.handle(b"not json").await.unwrap_err();
        assert!(matches!(err, HandlerError::Poison(_)));
        // The typed handler never ran.
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn business_error_is_failed_not_poison() {
        let handler = JsonHandler::new(CountingPing {
            seen: Arc::new(AtomicUsize::new(0)),
        });

        let err = handler.handle(br#"{"n": 0}"#).await.unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }
}
