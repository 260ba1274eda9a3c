//! # Cart Repository
//!
//! Durable cart storage for authenticated customers.
//!
//! ## Merge-on-Add Without Read-Modify-Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two browser tabs add the same medicine concurrently:                  │
//! │                                                                         │
//! │  ❌ WRONG: SELECT quantity → add in memory → UPDATE                    │
//! │     (one tab's add is lost)                                            │
//! │                                                                         │
//! │  ✅ CORRECT: INSERT .. ON CONFLICT(owner, medicine)                    │
//! │              DO UPDATE SET quantity = quantity + excluded.quantity     │
//! │     (both adds land; the merge rule holds under races)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantity-set operations are last-write-wins per line, which is acceptable
//! for cart edits.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use medirun_core::CartLine;

/// Repository for durable (customer) cart lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Adds a quantity to the owner's line for this medicine, creating the
    /// line if absent (merge-on-add).
    pub async fn add(&self, owner_ref: &str, medicine_id: &str, quantity: i64) -> DbResult<()> {
        debug!(owner = %owner_ref, medicine_id = %medicine_id, quantity, "Cart add");

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO carts (owner_ref, medicine_id, quantity, added_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(owner_ref, medicine_id)
            DO UPDATE SET quantity = quantity + excluded.quantity
            "#,
        )
        .bind(owner_ref)
        .bind(medicine_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the quantity of an existing line.
    ///
    /// ## Returns
    /// `false` when the owner has no line for this medicine.
    pub async fn update_quantity(
        &self,
        owner_ref: &str,
        medicine_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE carts SET quantity = ?3 WHERE owner_ref = ?1 AND medicine_id = ?2",
        )
        .bind(owner_ref)
        .bind(medicine_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a line. Returns `false` when there was nothing to remove.
    pub async fn remove(&self, owner_ref: &str, medicine_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM carts WHERE owner_ref = ?1 AND medicine_id = ?2")
            .bind(owner_ref)
            .bind(medicine_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns the owner's cart lines in insertion order.
    pub async fn lines(&self, owner_ref: &str) -> DbResult<Vec<CartLine>> {
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT medicine_id, quantity
            FROM carts
            WHERE owner_ref = ?1
            ORDER BY added_at, medicine_id
            "#,
        )
        .bind(owner_ref)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Number of distinct lines in the owner's cart.
    pub async fn count_lines(&self, owner_ref: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts WHERE owner_ref = ?1")
            .bind(owner_ref)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Destroys the owner's cart. Called by checkout after the order is
    /// persisted, and by the login merge after moving guest lines over.
    pub async fn clear(&self, owner_ref: &str) -> DbResult<()> {
        debug!(owner = %owner_ref, "Clearing cart");

        sqlx::query("DELETE FROM carts WHERE owner_ref = ?1")
            .bind(owner_ref)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    const OWNER: &str = "customer:42";

    #[tokio::test]
    async fn test_add_merges_duplicate_lines() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let carts = db.carts();

        carts.add(OWNER, "med-1", 2).await.unwrap();
        carts.add(OWNER, "med-1", 3).await.unwrap();
        carts.add(OWNER, "med-2", 1).await.unwrap();

        let lines = carts.lines(OWNER).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].medicine_id, "med-1");
        assert_eq!(lines[0].quantity, 5);
        assert_eq!(carts.count_lines(OWNER).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_carts_are_isolated_per_owner() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let carts = db.carts();

        carts.add("customer:1", "med-1", 2).await.unwrap();
        carts.add("customer:2", "med-1", 7).await.unwrap();

        assert_eq!(carts.lines("customer:1").await.unwrap()[0].quantity, 2);
        assert_eq!(carts.lines("customer:2").await.unwrap()[0].quantity, 7);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let carts = db.carts();

        carts.add(OWNER, "med-1", 2).await.unwrap();

        assert!(carts.update_quantity(OWNER, "med-1", 9).await.unwrap());
        assert_eq!(carts.lines(OWNER).await.unwrap()[0].quantity, 9);
        assert!(!carts.update_quantity(OWNER, "ghost", 1).await.unwrap());

        assert!(carts.remove(OWNER, "med-1").await.unwrap());
        assert!(!carts.remove(OWNER, "med-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let carts = db.carts();

        carts.add(OWNER, "med-1", 2).await.unwrap();
        carts.add(OWNER, "med-2", 4).await.unwrap();

        carts.clear(OWNER).await.unwrap();
        assert!(carts.lines(OWNER).await.unwrap().is_empty());
    }
}
