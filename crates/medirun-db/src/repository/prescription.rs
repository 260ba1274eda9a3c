//! # Prescription Repository
//!
//! Database operations for uploaded prescriptions and their review state.
//!
//! Review-state changes use the same guarded-update shape as order status:
//! the expected current status is part of the WHERE clause, so two
//! pharmacists racing on the same prescription cannot both win.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use medirun_core::{Prescription, PrescriptionStatus};

const PRESCRIPTION_COLUMNS: &str = r#"
    id,
    order_id,
    owner_ref,
    file_ref,
    status,
    rejection_reason,
    uploaded_at,
    updated_at
"#;

/// Repository for prescription database operations.
#[derive(Debug, Clone)]
pub struct PrescriptionRepository {
    pool: SqlitePool,
}

impl PrescriptionRepository {
    /// Creates a new PrescriptionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PrescriptionRepository { pool }
    }

    /// Inserts a new prescription record.
    pub async fn insert(&self, prescription: &Prescription) -> DbResult<()> {
        debug!(id = %prescription.id, owner = %prescription.owner_ref, "Inserting prescription");

        sqlx::query(
            r#"
            INSERT INTO prescriptions (
                id, order_id, owner_ref, file_ref,
                status, rejection_reason, uploaded_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&prescription.id)
        .bind(&prescription.order_id)
        .bind(&prescription.owner_ref)
        .bind(&prescription.file_ref)
        .bind(prescription.status)
        .bind(&prescription.rejection_reason)
        .bind(prescription.uploaded_at)
        .bind(prescription.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a prescription by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Prescription>> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            "SELECT {} FROM prescriptions WHERE id = ?1",
            PRESCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(prescription)
    }

    /// Applies a review-state change with an optimistic guard.
    ///
    /// `rejection_reason` is written alongside the status (`Some` on reject,
    /// `None` otherwise, clearing any previous reason).
    ///
    /// ## Returns
    /// `false` when the prescription is missing or not in `expected`.
    pub async fn update_status(
        &self,
        id: &str,
        expected: PrescriptionStatus,
        next: PrescriptionStatus,
        rejection_reason: Option<&str>,
    ) -> DbResult<bool> {
        debug!(id = %id, from = ?expected, to = ?next, "Prescription status change");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE prescriptions
            SET status = ?3, rejection_reason = ?4, updated_at = ?5
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(rejection_reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Links a prescription to its order (1:1 once linked).
    pub async fn link_order(&self, id: &str, order_id: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE prescriptions SET order_id = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(order_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the document of a rejected prescription and resets it to
    /// pending review. The order link survives; no new order is created.
    ///
    /// ## Returns
    /// `false` when the prescription is missing or not rejected.
    pub async fn reupload(&self, id: &str, file_ref: &str) -> DbResult<bool> {
        debug!(id = %id, "Prescription re-upload");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE prescriptions
            SET file_ref = ?2,
                status = 'pending',
                rejection_reason = NULL,
                uploaded_at = ?3,
                updated_at = ?3
            WHERE id = ?1 AND status = 'rejected'
            "#,
        )
        .bind(id)
        .bind(file_ref)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists prescriptions awaiting review, oldest first (pharmacist queue).
    pub async fn list_pending(&self) -> DbResult<Vec<Prescription>> {
        let prescriptions = sqlx::query_as::<_, Prescription>(&format!(
            "SELECT {} FROM prescriptions WHERE status = 'pending' ORDER BY uploaded_at",
            PRESCRIPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(prescriptions)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
