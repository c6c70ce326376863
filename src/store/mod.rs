use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Order, OrderStatus};
use crate::error::RelayError;

pub mod mysql;

pub use mysql::MySqlOrderStore;

/// Durable record of orders and their status.
///
/// Every implementation exposes the guarded transition; stores without native
/// conditional-update support implement it as an optimistic compare-and-swap
/// on the status column. There is no runtime capability probing.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), RelayError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, RelayError>;

    async fn get_by_user_and_idem_key(
        &self,
        user_id: &str,
        idem_key: &str,
    ) -> Result<Option<Order>, RelayError>;

    /// Unconditional status update. Strictly less safe than
    /// [`update_status_if`](OrderStore::update_status_if) under duplicate or
    /// out-of-order event delivery; the reconciler never uses it.
    async fn update_status(&self, id: Uuid, to: OrderStatus) -> Result<(), RelayError>;

    /// Guarded transition: applies only if the row's current status equals
    /// `from`. Returns whether a row actually changed; a miss (already
    /// reconciled, unknown id) is not an error.
    async fn update_status_if(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RelayError>;
}
