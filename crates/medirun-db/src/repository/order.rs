//! # Order Repository
//!
//! Database operations for orders and their frozen lines.
//!
//! ## Order Persistence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Order Write Paths                                  │
//! │                                                                         │
//! │  1. CHECKOUT                                                           │
//! │     └── insert_with_lines() → order + all lines in ONE transaction     │
//! │         (a crash can never leave a headless order or orphan lines)     │
//! │                                                                         │
//! │  2. STATUS TRANSITIONS                                                 │
//! │     └── update_status(id, expected, next)                              │
//! │         UPDATE orders SET status = next                                │
//! │          WHERE id = ? AND status = expected                            │
//! │         Zero rows = a concurrent transition won; the engine reports    │
//! │         InvalidTransition. This is the per-order serialization.        │
//! │                                                                         │
//! │  Nothing else ever writes an order row.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use medirun_core::{Order, OrderLine, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id,
    order_number,
    owner_ref,
    status,
    delivery_address,
    delivery_window,
    weight_grams,
    total_cents,
    reservation_token,
    created_at,
    updated_at
"#;

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Persists an order together with all of its lines atomically.
    ///
    /// Checkout relies on this being one transaction: if it fails, the
    /// caller compensates by releasing the stock reservation, and no
    /// half-written order is ever visible.
    pub async fn insert_with_lines(&self, order: &Order, lines: &[OrderLine]) -> DbResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, lines = lines.len(), "Inserting order");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, owner_ref, status,
                delivery_address, delivery_window,
                weight_grams, total_cents, reservation_token,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.owner_ref)
        .bind(order.status)
        .bind(&order.delivery_address)
        .bind(&order.delivery_window)
        .bind(order.weight_grams)
        .bind(order.total_cents)
        .bind(&order.reservation_token)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    order_id, line_no, medicine_id, quantity, unit_price_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&line.order_id)
            .bind(line.line_no)
            .bind(&line.medicine_id)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = ?1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets all lines for an order, in line order.
    pub async fn lines(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT order_id, line_no, medicine_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Applies a status transition with an optimistic guard.
    ///
    /// ## Returns
    /// * `Ok(true)` - the order was in `expected` and is now in `next`
    /// * `Ok(false)` - no such order, or a concurrent transition got there
    ///   first (the caller reports `InvalidTransition`)
    pub async fn update_status(
        &self,
        id: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> DbResult<bool> {
        debug!(id = %id, from = %expected, to = %next, "Order status transition");

        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists orders in a given status, newest first (manager views).
    pub async fn list_by_status(&self, status: OrderStatus) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE status = ?1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
