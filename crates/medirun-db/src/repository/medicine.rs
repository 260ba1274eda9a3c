//! # Medicine Repository
//!
//! Catalog reads and writes for medicines.
//!
//! Stock is deliberately absent from this repository's write surface:
//! `stock_on_hand` belongs to the ledger, and carrying a second writer here
//! is how drift starts. Deletion is soft (`is_active = 0`) so historical
//! order lines and pending releases keep a valid target row.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use medirun_core::Medicine;

const MEDICINE_COLUMNS: &str = r#"
    id,
    name,
    category,
    unit_price_cents,
    stock_on_hand,
    requires_prescription,
    is_active,
    created_at,
    updated_at
"#;

/// Repository for medicine catalog operations.
#[derive(Debug, Clone)]
pub struct MedicineRepository {
    pool: SqlitePool,
}

impl MedicineRepository {
    /// Creates a new MedicineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MedicineRepository { pool }
    }

    /// Gets a medicine by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Medicine))` - found (active or not)
    /// * `Ok(None)` - no such row
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Medicine>> {
        let medicine = sqlx::query_as::<_, Medicine>(&format!(
            "SELECT {} FROM medicines WHERE id = ?1",
            MEDICINE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(medicine)
    }

    /// Lists active (orderable) medicines, name order.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Medicine>> {
        let medicines = sqlx::query_as::<_, Medicine>(&format!(
            "SELECT {} FROM medicines WHERE is_active = 1 ORDER BY name LIMIT ?1",
            MEDICINE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(medicines)
    }

    /// Inserts a new medicine.
    pub async fn insert(&self, medicine: &Medicine) -> DbResult<()> {
        debug!(id = %medicine.id, name = %medicine.name, "Inserting medicine");

        sqlx::query(
            r#"
            INSERT INTO medicines (
                id, name, category, unit_price_cents,
                stock_on_hand, requires_prescription, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&medicine.id)
        .bind(&medicine.name)
        .bind(&medicine.category)
        .bind(medicine.unit_price_cents)
        .bind(medicine.stock_on_hand)
        .bind(medicine.requires_prescription)
        .bind(medicine.is_active)
        .bind(medicine.created_at)
        .bind(medicine.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes a medicine by setting is_active = 0.
    ///
    /// ## Why Soft Delete?
    /// - Historical order lines still reference this medicine
    /// - A cancellation can still credit reserved stock back to the row
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting medicine");

        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE medicines SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medicine", id));
        }

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

    fn sample(id: &str) -> Medicine {
        let now = Utc::now();
        Medicine {
            id: id.to_string(),
            name: "Paracetamol 500mg".to_string(),
            category: Some("Painkillers".to_string()),
            unit_price_cents: 349,
            stock_on_hand: 20,
            requires_prescription: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.medicines().insert(&sample("m-1")).await.unwrap();

        let loaded = db.medicines().get_by_id("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Paracetamol 500mg");
        assert_eq!(loaded.stock_on_hand, 20);
        assert_eq!(loaded.price().cents(), 349);
        assert!(db.medicines().get_by_id("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_active_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.medicines().insert(&sample("m-1")).await.unwrap();

        assert_eq!(db.medicines().list_active(10).await.unwrap().len(), 1);

        db.medicines().soft_delete("m-1").await.unwrap();
        assert!(db.medicines().list_active(10).await.unwrap().is_empty());

        // Row still exists for historical references.
        let loaded = db.medicines().get_by_id("m-1").await.unwrap().unwrap();
        assert!(!loaded.is_active);

        assert!(matches!(
            db.medicines().soft_delete("ghost").await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}
