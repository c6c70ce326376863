use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

use crate::domain::{Money, Order, OrderStatus};
use crate::error::RelayError;
use crate::utils::bounded;
use std::time::Duration;

// ============================================================================
// MySQL Order Store
// ============================================================================
//
// Rows live in the `orders` table (see migrations/). The guarded transition
// is a conditional UPDATE on the status column; `rows_affected` tells the
// caller whether the precondition held.
//
// ============================================================================

pub struct MySqlOrderStore {
    pool: MySqlPool,
    /// Per-statement deadline; pool acquire timeouts alone do not bound a
    /// statement that stalls after the connection is checked out.
    call_timeout: Duration,
}

impl MySqlOrderStore {
    pub fn new(pool: MySqlPool, call_timeout: Duration) -> Self {
        Self { pool, call_timeout }
    }
}

const SELECT_COLUMNS: &str =
    "id, user_id, status, amount_cents, currency, items_json, idempotency_key";

fn order_from_row(row: &MySqlRow) -> Result<Order, RelayError> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| RelayError::transient(anyhow::Error::new(e).context("corrupt order id")))?;

    let status: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status).ok_or_else(|| {
        RelayError::transient(anyhow::anyhow!("unknown status in orders row: {status}"))
    })?;

    Ok(Order {
        id,
        user_id: row.try_get("user_id")?,
        status,
        amount: Money {
            cents: row.try_get("amount_cents")?,
            currency: row.try_get("currency")?,
        },
        items_json: row.try_get("items_json")?,
        idempotency_key: row.try_get("idempotency_key")?,
    })
}

#[async_trait]
impl crate::store::OrderStore for MySqlOrderStore {
    async fn create(&self, order: &Order) -> Result<(), RelayError> {
        bounded(self.call_timeout, "order insert", async {
            sqlx::query(
                "INSERT INTO orders \
                 (id, user_id, status, amount_cents, currency, items_json, idempotency_key, \
                  created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, NOW(), NOW())",
            )
            .bind(order.id.to_string())
            .bind(&order.user_id)
            .bind(order.status.as_str())
            .bind(order.amount.cents)
            .bind(&order.amount.currency)
            .bind(&order.items_json)
            .bind(&order.idempotency_key)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, RelayError> {
        let row = bounded(self.call_timeout, "order select by id", async {
            let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM orders WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        })
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn get_by_user_and_idem_key(
        &self,
        user_id: &str,
        idem_key: &str,
    ) -> Result<Option<Order>, RelayError> {
        let row = bounded(self.call_timeout, "order select by idempotency key", async {
            let row = sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM orders WHERE user_id = ? AND idempotency_key = ?"
            ))
            .bind(user_id)
            .bind(idem_key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_status(&self, id: Uuid, to: OrderStatus) -> Result<(), RelayError> {
        bounded(self.call_timeout, "order status update", async {
            sqlx::query("UPDATE orders SET status = ?, updated_at = NOW() WHERE id = ?")
                .bind(to.as_str())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RelayError> {
        let result = bounded(self.call_timeout, "order guarded status update", async {
            let result = sqlx::query(
                "UPDATE orders SET status = ?, updated_at = NOW() WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(id.to_string())
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
            Ok(result)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
