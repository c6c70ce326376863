use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

pub mod handler;

pub use handler::{Handler, HandlerError, JsonHandler, TypedHandler};

// ============================================================================
// Queue Dispatcher
// ============================================================================
//
// Binds named queues to handlers and runs one worker per queue. Workers
// process deliveries sequentially within a queue but concurrently across
// queues, bounded by a single prefetch limit shared by all of them.
//
// Per delivery:
//   decode failure  -> discard without retry (poison)
//   handler ok      -> ack
//   handler error   -> nack with the queue's requeue flag (default: requeue)
//
// Each worker owns a child cancellation token; shutdown cancels all tokens
// and joins the tasks. No fire-and-forget background work.
//
// ============================================================================

/// Confirms or rejects a single delivery back to the broker.
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> Result<(), RelayError>;

    /// `requeue = true` makes the delivery eligible for redelivery;
    /// `requeue = false` discards it.
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), RelayError>;
}

pub struct Delivery {
    body: Vec<u8>,
    ack: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, ack: Box<dyn Acknowledger>) -> Self {
        Self { body, ack }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub async fn ack(self) -> Result<(), RelayError> {
        self.ack.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), RelayError> {
        self.ack.nack(requeue).await
    }
}

/// One named queue's stream of deliveries. `Ok(None)` means the queue is
/// closed and the worker should stop.
#[async_trait]
pub trait QueueSource: Send {
    async fn recv(&mut self) -> Result<Option<Delivery>, RelayError>;
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// In-flight delivery limit shared across all bound queues.
    pub prefetch: usize,
    /// Deadline for a single handler invocation.
    pub handler_timeout: Duration,
    /// Default requeue policy for handler failures. Disable per queue for
    /// handlers known to be non-idempotent.
    pub requeue_on_error: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            prefetch: 50,
            handler_timeout: Duration::from_secs(10),
            requeue_on_error: true,
        }
    }
}

struct Binding {
    queue: String,
    source: Box<dyn QueueSource>,
    handler: Arc<dyn Handler>,
    requeue_on_error: bool,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    bindings: Vec<Binding>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            bindings: Vec::new(),
        }
    }

    /// Bind a queue with the dispatcher-wide requeue policy.
    pub fn bind(
        &mut self,
        queue: impl Into<String>,
        source: Box<dyn QueueSource>,
        handler: Arc<dyn Handler>,
    ) {
        let requeue = self.config.requeue_on_error;
        self.bind_with_requeue(queue, source, handler, requeue);
    }

    /// Bind a queue with an explicit requeue policy override.
    pub fn bind_with_requeue(
        &mut self,
        queue: impl Into<String>,
        source: Box<dyn QueueSource>,
        handler: Arc<dyn Handler>,
        requeue_on_error: bool,
    ) {
        self.bindings.push(Binding {
            queue: queue.into(),
            source,
            handler,
            requeue_on_error,
        });
    }

    /// Spawn one worker per binding and hand back the stop contract.
    pub fn start(self) -> DispatcherHandle {
        let token = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(self.config.prefetch.max(1)));
        let handler_timeout = self.config.handler_timeout;

        let workers = self
            .bindings
            .into_iter()
            .map(|binding| {
                let worker_token = token.child_token();
                let permits = permits.clone();
                tokio::spawn(run_worker(binding, worker_token, permits, handler_timeout))
            })
            .collect();

        DispatcherHandle { token, workers }
    }
}

pub struct DispatcherHandle {
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Cancel every worker and wait for all of them to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for worker in self.workers {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "consumer worker panicked");
            }
        }
    }
}

async fn run_worker(
    mut binding: Binding,
    token: CancellationToken,
    permits: Arc<Semaphore>,
    handler_timeout: Duration,
) {
    let queue = binding.queue;
    tracing::info!(queue = %queue, requeue = binding.requeue_on_error, "consumer started");

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = binding.source.recv() => next,
        };

        match next {
            Ok(Some(delivery)) => {
                let _permit = match permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                process_delivery(
                    &queue,
                    binding.handler.as_ref(),
                    delivery,
                    handler_timeout,
                    binding.requeue_on_error,
                )
                .await;
            }
            Ok(None) => {
                tracing::info!(queue = %queue, "queue closed");
                break;
            }
            Err(err) => {
                tracing::warn!(queue = %queue, error = %err, "receive failed");
                // Back off briefly so a dead broker does not spin the loop.
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }

    tracing::info!(queue = %queue, "consumer stopped");
}

async fn process_delivery(
    queue: &str,
    handler: &dyn Handler,
    delivery: Delivery,
    handler_timeout: Duration,
    requeue_on_error: bool,
) {
    let outcome = tokio::time::timeout(handler_timeout, handler.handle(delivery.body())).await;

    let result = match outcome {
        Ok(Ok(())) => delivery.ack().await,
        Ok(Err(HandlerError::Poison(err))) => {
            tracing::warn!(queue = %queue, error = %err, "discarding poison message");
            delivery.nack(false).await
        }
        Ok(Err(HandlerError::Failed(err))) => {
            tracing::warn!(
                queue = %queue,
                error = %err,
                requeue = requeue_on_error,
                "handler error"
            );
            delivery.nack(requeue_on_error).await
        }
        Err(_) => {
            tracing::warn!(
                queue = %queue,
                timeout_ms = handler_timeout.as_millis() as u64,
                requeue = requeue_on_error,
                "handler timed out"
            );
            delivery.nack(requeue_on_error).await
        }
    };

    if let Err(err) = result {
        tracing::warn!(queue = %queue, error = %err, "broker acknowledgment failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedQueue, ScriptedQueueState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyHandler {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait]
    impl Handler for FlakyHandler {
        async fn handle(&self, _body: &[u8]) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(HandlerError::Failed(anyhow::anyhow!("transient")));
            }
            Ok(())
        }
    }

    struct PoisonAware;

    #[async_trait]
    impl Handler for PoisonAware {
        async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
            let _: serde_json::Value =
                serde_json::from_slice(body).map_err(HandlerError::Poison)?;
            Ok(())
        }
    }

    async fn run_until_drained(dispatcher: Dispatcher, state: &Arc<ScriptedQueueState>) {
        let handle = dispatcher.start();
        // Workers exit on their own once the scripted queue reports closed.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !state.is_drained() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn handler_error_is_redelivered_when_requeue_enabled() {
        let state = ScriptedQueueState::with_messages(vec![b"{}".to_vec()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new(DispatcherConfig::default());
        dispatcher.bind(
            "orders.test",
            Box::new(ScriptedQueue::new(state.clone())),
            Arc::new(FlakyHandler {
                calls: calls.clone(),
                fail_first: 2,
            }),
        );
        run_until_drained(dispatcher, &state).await;

        // Two failed attempts requeued, third succeeds.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.acked(), 1);
        assert_eq!(state.discarded(), 0);
    }

    #[tokio::test]
    async fn handler_error_is_discarded_when_requeue_disabled() {
        let state = ScriptedQueueState::with_messages(vec![b"{}".to_vec()]);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new(DispatcherConfig::default());
        dispatcher.bind_with_requeue(
            "orders.test",
            Box::new(ScriptedQueue::new(state.clone())),
            Arc::new(FlakyHandler {
                calls: calls.clone(),
                fail_first: usize::MAX,
            }),
            false,
        );
        run_until_drained(dispatcher, &state).await;

        // Exactly one attempt, then the delivery is gone.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.acked(), 0);
        assert_eq!(state.discarded(), 1);
    }

    #[tokio::test]
    async fn poison_message_does_not_stall_the_queue() {
        let state = ScriptedQueueState::with_messages(vec![
            b"definitely not json".to_vec(),
            b"{\"ok\":true}".to_vec(),
        ]);

        let mut dispatcher = Dispatcher::new(DispatcherConfig::default());
        dispatcher.bind(
            "orders.test",
            Box::new(ScriptedQueue::new(state.clone())),
            Arc::new(PoisonAware),
        );
        run_until_drained(dispatcher, &state).await;

        // Poison discarded without retry; the valid delivery still processed.
        assert_eq!(state.discarded(), 1);
        assert_eq!(state.acked(), 1);
        assert_eq!(state.attempts(), 2);
    }

    #[tokio::test]
    async fn shutdown_joins_idle_workers() {
        let state = ScriptedQueueState::open_ended();
        let mut dispatcher = Dispatcher::new(DispatcherConfig::default());
        dispatcher.bind(
            "orders.idle",
            Box::new(ScriptedQueue::new(state.clone())),
            Arc::new(PoisonAware),
        );

        let handle = dispatcher.start();
        // Worker is parked in recv with nothing to do; shutdown must still
        // return promptly.
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
