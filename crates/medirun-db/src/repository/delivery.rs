//! # Delivery Repository
//!
//! Database operations for delivery legs.
//!
//! A delivery row mirrors the tail of the order state machine; lifecycle
//! decisions are made against the order, and the delivery row follows. The
//! UNIQUE constraint on `order_id` keeps the 1:1 pairing honest even if two
//! managers race an assignment.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use medirun_core::{Delivery, DeliveryStatus};

const DELIVERY_COLUMNS: &str = r#"
    id,
    order_id,
    driver_id,
    status,
    eta,
    notes,
    recipient_name,
    proof_ref,
    created_at,
    updated_at
"#;

/// One active delivery joined with its planning context: the order's
/// requested window and the assigned driver. Feeds the capacity view.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveSlotRow {
    pub delivery_window: String,
    pub driver_id: String,
    pub driver_name: String,
}

/// Repository for delivery database operations.
#[derive(Debug, Clone)]
pub struct DeliveryRepository {
    pool: SqlitePool,
}

impl DeliveryRepository {
    /// Creates a new DeliveryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeliveryRepository { pool }
    }

    /// Inserts a new delivery record (created at assignment time).
    pub async fn insert(&self, delivery: &Delivery) -> DbResult<()> {
        debug!(id = %delivery.id, order_id = %delivery.order_id, driver_id = %delivery.driver_id, "Inserting delivery");

        sqlx::query(
            r#"
            INSERT INTO deliveries (
                id, order_id, driver_id, status,
                eta, notes, recipient_name, proof_ref,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&delivery.id)
        .bind(&delivery.order_id)
        .bind(&delivery.driver_id)
        .bind(delivery.status)
        .bind(&delivery.eta)
        .bind(&delivery.notes)
        .bind(&delivery.recipient_name)
        .bind(&delivery.proof_ref)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a delivery by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(&format!(
            "SELECT {} FROM deliveries WHERE id = ?1",
            DELIVERY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }

    /// Applies a delivery status step with an optimistic guard.
    ///
    /// ## Returns
    /// `false` when the delivery is missing or not in `expected`.
    pub async fn update_status(
        &self,
        id: &str,
        expected: DeliveryStatus,
        next: DeliveryStatus,
    ) -> DbResult<bool> {
        debug!(id = %id, from = ?expected, to = ?next, "Delivery status step");

        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE deliveries SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Updates the customer-facing ETA.
    pub async fn set_eta(&self, id: &str, eta: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query("UPDATE deliveries SET eta = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(eta)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Completes an in-transit delivery with proof of delivery.
    pub async fn mark_delivered(
        &self,
        id: &str,
        recipient_name: &str,
        proof_ref: &str,
    ) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'delivered', recipient_name = ?2, proof_ref = ?3, updated_at = ?4
            WHERE id = ?1 AND status = 'in_transit'
            "#,
        )
        .bind(id)
        .bind(recipient_name)
        .bind(proof_ref)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fails an in-transit delivery, recording the reported issue.
    pub async fn mark_failed(&self, id: &str, notes: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'failed', notes = ?2, updated_at = ?3
            WHERE id = ?1 AND status = 'in_transit'
            "#,
        )
        .bind(id)
        .bind(notes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminates a non-terminal delivery leg whose order was cancelled,
    /// so the driver's derived load drops immediately.
    pub async fn void_for_order(&self, order_id: &str, notes: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'failed', notes = ?2, updated_at = ?3
            WHERE order_id = ?1 AND status NOT IN ('delivered', 'failed')
            "#,
        )
        .bind(order_id)
        .bind(notes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Derived driver load: count of the driver's non-terminal deliveries.
    pub async fn count_active_for_driver(&self, driver_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM deliveries
            WHERE driver_id = ?1 AND status NOT IN ('delivered', 'failed')
            "#,
        )
        .bind(driver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Active deliveries joined with window and driver, for slot planning.
    pub async fn active_slots(&self) -> DbResult<Vec<ActiveSlotRow>> {
        let rows = sqlx::query_as::<_, ActiveSlotRow>(
            r#"
            SELECT o.delivery_window AS delivery_window,
                   d.driver_id       AS driver_id,
                   r.name            AS driver_name
            FROM deliveries d
            JOIN orders o ON o.id = d.order_id
            JOIN drivers r ON r.id = d.driver_id
            WHERE d.status NOT IN ('delivered', 'failed')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
