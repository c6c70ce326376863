//! In-memory doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::dispatch::{Acknowledger, Delivery, QueueSource};
use crate::domain::{Order, OrderStatus};
use crate::error::RelayError;
use crate::idempotency::IdempotencyGate;
use crate::messaging::{CreatedEventPublisher, OrderCreated};
use crate::store::OrderStore;

// ---------------------------------------------------------------------------
// Order store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn insert(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id, order);
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn status_of(&self, id: Uuid) -> Option<OrderStatus> {
        self.orders.lock().unwrap().get(&id).map(|o| o.status)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), RelayError> {
        self.orders.lock().unwrap().insert(order.id, order.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, RelayError> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_user_and_idem_key(
        &self,
        user_id: &str,
        idem_key: &str,
    ) -> Result<Option<Order>, RelayError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.user_id == user_id && o.idempotency_key.as_deref() == Some(idem_key))
            .cloned())
    }

    async fn update_status(&self, id: Uuid, to: OrderStatus) -> Result<(), RelayError> {
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id) {
            order.status = to;
        }
        Ok(())
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RelayError> {
        let mut orders = self.orders.lock().unwrap();
        match orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Idempotency gate
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryGate {
    locks: Mutex<HashSet<(String, String)>>,
    mappings: Mutex<HashMap<(String, String), String>>,
    lock_calls: AtomicUsize,
}

impl InMemoryGate {
    /// Number of try_lock attempts made against the gate.
    pub fn lock_count(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdempotencyGate for InMemoryGate {
    async fn try_lock(&self, scope: &str, key: &str) -> Result<bool, RelayError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .locks
            .lock()
            .unwrap()
            .insert((scope.to_string(), key.to_string())))
    }

    async fn remember(&self, scope: &str, key: &str, order_id: &str) -> Result<(), RelayError> {
        self.mappings
            .lock()
            .unwrap()
            .insert((scope.to_string(), key.to_string()), order_id.to_string());
        Ok(())
    }

    async fn recall(&self, scope: &str, key: &str) -> Result<Option<String>, RelayError> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .get(&(scope.to_string(), key.to_string()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Status cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCache {
    statuses: Mutex<HashMap<Uuid, OrderStatus>>,
    failing: bool,
}

impl InMemoryCache {
    /// A cache whose writes always fail; callers must swallow that.
    pub fn failing() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            failing: true,
        }
    }

    pub fn get(&self, order_id: Uuid) -> Option<OrderStatus> {
        self.statuses.lock().unwrap().get(&order_id).copied()
    }
}

#[async_trait]
impl StatusCache for InMemoryCache {
    async fn set_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), RelayError> {
        if self.failing {
            return Err(RelayError::transient(anyhow::anyhow!("cache down")));
        }
        self.statuses.lock().unwrap().insert(order_id, status);
        Ok(())
    }

    async fn get_status(&self, order_id: Uuid) -> Result<Option<OrderStatus>, RelayError> {
        if self.failing {
            return Err(RelayError::transient(anyhow::anyhow!("cache down")));
        }
        Ok(self.get(order_id))
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<OrderCreated>>,
    fail_next: AtomicBool,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<OrderCreated> {
        self.published.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CreatedEventPublisher for RecordingPublisher {
    async fn publish_created(&self, event: &OrderCreated) -> Result<(), RelayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RelayError::transient(anyhow::anyhow!("broker down")));
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted queue
// ---------------------------------------------------------------------------
//
// Backs the dispatcher tests: counts delivery attempts, re-enqueues on
// nack(requeue = true), and reports closed once everything settled (or stays
// open forever for shutdown tests).

pub struct ScriptedQueueState {
    pending: Mutex<VecDeque<Vec<u8>>>,
    in_flight: AtomicUsize,
    attempts: AtomicUsize,
    acked: AtomicUsize,
    discarded: AtomicUsize,
    open_ended: bool,
}

impl ScriptedQueueState {
    pub fn with_messages(messages: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(messages.into()),
            in_flight: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            open_ended: false,
        })
    }

    /// A queue that never closes; recv parks until the worker is cancelled.
    pub fn open_ended() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            open_ended: true,
        })
    }

    pub fn push(&self, body: Vec<u8>) {
        self.pending.lock().unwrap().push_back(body);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    pub fn is_drained(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
            && self.in_flight.load(Ordering::SeqCst) == 0
            && self.attempts() > 0
    }
}

pub struct ScriptedQueue {
    state: Arc<ScriptedQueueState>,
}

impl ScriptedQueue {
    pub fn new(state: Arc<ScriptedQueueState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl QueueSource for ScriptedQueue {
    async fn recv(&mut self) -> Result<Option<Delivery>, RelayError> {
        let next = self.state.pending.lock().unwrap().pop_front();
        match next {
            Some(body) => {
                self.state.in_flight.fetch_add(1, Ordering::SeqCst);
                self.state.attempts.fetch_add(1, Ordering::SeqCst);
                let ack = ScriptedAck {
                    state: self.state.clone(),
                    body: body.clone(),
                };
                Ok(Some(Delivery::new(body, Box::new(ack))))
            }
            None if self.state.open_ended => {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(None),
        }
    }
}

struct ScriptedAck {
    state: Arc<ScriptedQueueState>,
    body: Vec<u8>,
}

#[async_trait]
impl Acknowledger for ScriptedAck {
    async fn ack(self: Box<Self>) -> Result<(), RelayError> {
        self.state.acked.fetch_add(1, Ordering::SeqCst);
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), RelayError> {
        if requeue {
            self.state.push(self.body.clone());
        } else {
            self.state.discarded.fetch_add(1, Ordering::SeqCst);
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
