//! # Stock Ledger
//!
//! The only code path in the system allowed to mutate `stock_on_hand`.
//!
//! ## All-or-Nothing Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    reserve_all(lines)                                   │
//! │                                                                         │
//! │  BEGIN TRANSACTION                                                      │
//! │       │                                                                 │
//! │       ▼  per line, in order                                             │
//! │  UPDATE medicines                                                       │
//! │     SET stock_on_hand = stock_on_hand - qty                            │
//! │   WHERE id = ? AND stock_on_hand >= qty                                │
//! │       │                                                                 │
//! │       ├── rows_affected = 0?  → ROLLBACK, return Insufficient          │
//! │       │                         (NO line was depleted)                 │
//! │       ▼                                                                 │
//! │  INSERT reservation token + per-line records                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT → Reservation { token }                                        │
//! │                                                                         │
//! │  Two concurrent checkouts contending on the last units: the           │
//! │  conditional UPDATE decides at the storage layer, so at most one      │
//! │  commits. In-process locks are never part of the guarantee.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single-Use Release
//! A release first flips `released` 0→1 with a guarded UPDATE. The second
//! release of the same token finds nothing to flip and fails without
//! touching stock, so double-crediting is structurally impossible, and the
//! amounts credited are exactly the recorded reservation lines, so releasing
//! more than was reserved cannot be expressed at all.

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbError;

// =============================================================================
// Ledger Errors
// =============================================================================

/// Failures specific to stock reservation and release.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// One of the requested lines cannot be satisfied. Reported with the
    /// failing medicine so the caller can render "only N units available".
    #[error("insufficient stock for {medicine_id}: available {available}, requested {requested}")]
    Insufficient {
        medicine_id: String,
        available: i64,
        requested: i64,
    },

    /// The reservation token was already released; stock was credited the
    /// first time and must not be credited again.
    #[error("reservation {token} was already released")]
    AlreadyReleased { token: String },

    /// The token was never issued by this ledger.
    #[error("unknown reservation token: {token}")]
    UnknownReservation { token: String },

    /// Underlying database failure.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Db(err.into())
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// Proof of a successful atomic stock reservation.
///
/// The token is usable exactly once for a matching release.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub token: String,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Owns every mutation of `medicines.stock_on_hand`.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Atomically reserves stock for every line, or for none of them.
    ///
    /// ## Arguments
    /// * `lines` - (medicine_id, quantity) pairs; quantities must be positive
    ///   (validated upstream, re-checked by the schema)
    ///
    /// ## Returns
    /// * `Ok(Reservation)` - all lines decremented, token recorded
    /// * `Err(LedgerError::Insufficient)` - no line was mutated
    pub async fn reserve_all(&self, lines: &[(String, i64)]) -> Result<Reservation, LedgerError> {
        if lines.is_empty() {
            return Err(LedgerError::Db(DbError::Internal(
                "cannot reserve an empty line set".to_string(),
            )));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (medicine_id, quantity) in lines {
            let result = sqlx::query(
                r#"
                UPDATE medicines
                SET stock_on_hand = stock_on_hand - ?1,
                    updated_at = ?2
                WHERE id = ?3 AND stock_on_hand >= ?1
                "#,
            )
            .bind(quantity)
            .bind(now)
            .bind(medicine_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // Either not enough stock or the medicine is gone entirely;
                // report what is actually available right now.
                let available: i64 =
                    sqlx::query_scalar("SELECT stock_on_hand FROM medicines WHERE id = ?1")
                        .bind(medicine_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .unwrap_or(0);

                tx.rollback().await?;

                debug!(
                    medicine_id = %medicine_id,
                    available,
                    requested = quantity,
                    "Reservation aborted, rolling back"
                );

                return Err(LedgerError::Insufficient {
                    medicine_id: medicine_id.clone(),
                    available,
                    requested: *quantity,
                });
            }
        }

        let token = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO reservations (token, released, created_at) VALUES (?1, 0, ?2)")
            .bind(&token)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        for (medicine_id, quantity) in lines {
            sqlx::query(
                "INSERT INTO reservation_lines (token, medicine_id, quantity) VALUES (?1, ?2, ?3)",
            )
            .bind(&token)
            .bind(medicine_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(token = %token, lines = lines.len(), "Stock reserved");

        Ok(Reservation { token })
    }

    /// Credits the reserved quantities back, exactly once per token.
    ///
    /// ## Returns
    /// * `Ok(())` - stock restored for all recorded lines
    /// * `Err(AlreadyReleased)` - the token was consumed earlier; no change
    /// * `Err(UnknownReservation)` - the token was never issued
    pub async fn release_all(&self, token: &str) -> Result<(), LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Single-use guard: only the call that flips the flag credits stock.
        let flipped = sqlx::query(
            "UPDATE reservations SET released = 1 WHERE token = ?1 AND released = 0",
        )
        .bind(token)
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT released FROM reservations WHERE token = ?1")
                    .bind(token)
                    .fetch_optional(&mut *tx)
                    .await?;

            tx.rollback().await?;

            return Err(match exists {
                Some(_) => LedgerError::AlreadyReleased {
                    token: token.to_string(),
                },
                None => LedgerError::UnknownReservation {
                    token: token.to_string(),
                },
            });
        }

        let lines: Vec<(String, i64)> = sqlx::query_as(
            "SELECT medicine_id, quantity FROM reservation_lines WHERE token = ?1",
        )
        .bind(token)
        .fetch_all(&mut *tx)
        .await?;

        for (medicine_id, quantity) in &lines {
            let result = sqlx::query(
                r#"
                UPDATE medicines
                SET stock_on_hand = stock_on_hand + ?1,
                    updated_at = ?2
                WHERE id = ?3
                "#,
            )
            .bind(quantity)
            .bind(now)
            .bind(medicine_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // The medicine row was hard-deleted since checkout. The
                // catalog soft-deletes, so this only happens after
                // out-of-band cleanup; skip the credit rather than wedging
                // the cancellation forever.
                warn!(
                    token = %token,
                    medicine_id = %medicine_id,
                    quantity,
                    "Release target missing from catalog, skipping credit"
                );
            }
        }

        tx.commit().await?;

        info!(token = %token, lines = lines.len(), "Reservation released");

        Ok(())
    }

    /// Reads the released flag for a token (diagnostics/tests).
    pub async fn is_released(&self, token: &str) -> Result<bool, LedgerError> {
        let released: Option<i64> =
            sqlx::query_scalar("SELECT released FROM reservations WHERE token = ?1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        match released {
            Some(flag) => Ok(flag != 0),
            None => Err(LedgerError::UnknownReservation {
                token: token.to_string(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use medirun_core::Medicine;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_medicine(db: &Database, id: &str, stock: i64) {
        let now = Utc::now();
        db.medicines()
            .insert(&Medicine {
                id: id.to_string(),
                name: format!("Medicine {}", id),
                category: None,
                unit_price_cents: 500,
                stock_on_hand: stock,
                requires_prescription: false,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn stock_of(db: &Database, id: &str) -> i64 {
        db.medicines()
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .stock_on_hand
    }

    #[tokio::test]
    async fn test_reserve_decrements_all_lines() {
        let db = test_db().await;
        seed_medicine(&db, "a", 10).await;
        seed_medicine(&db, "b", 5).await;

        let reservation = db
            .ledger()
            .reserve_all(&[("a".to_string(), 4), ("b".to_string(), 2)])
            .await
            .unwrap();

        assert_eq!(stock_of(&db, "a").await, 6);
        assert_eq!(stock_of(&db, "b").await, 3);
        assert!(!db.ledger().is_released(&reservation.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let db = test_db().await;
        seed_medicine(&db, "a", 10).await;
        seed_medicine(&db, "b", 1).await;

        let err = db
            .ledger()
            .reserve_all(&[("a".to_string(), 4), ("b".to_string(), 2)])
            .await
            .unwrap_err();

        match err {
            LedgerError::Insufficient {
                medicine_id,
                available,
                requested,
            } => {
                assert_eq!(medicine_id, "b");
                assert_eq!(available, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("expected Insufficient, got {:?}", other),
        }

        // The satisfiable line must not have been depleted either.
        assert_eq!(stock_of(&db, "a").await, 10);
        assert_eq!(stock_of(&db, "b").await, 1);
    }

    #[tokio::test]
    async fn test_reserve_unknown_medicine_reports_zero_available() {
        let db = test_db().await;

        let err = db
            .ledger()
            .reserve_all(&[("ghost".to_string(), 1)])
            .await
            .unwrap_err();

        match err {
            LedgerError::Insufficient { available, .. } => assert_eq!(available, 0),
            other => panic!("expected Insufficient, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_restores_stock_once() {
        let db = test_db().await;
        seed_medicine(&db, "a", 8).await;

        let reservation = db
            .ledger()
            .reserve_all(&[("a".to_string(), 3)])
            .await
            .unwrap();
        assert_eq!(stock_of(&db, "a").await, 5);

        db.ledger().release_all(&reservation.token).await.unwrap();
        assert_eq!(stock_of(&db, "a").await, 8);

        // Second release is rejected and credits nothing.
        let err = db.ledger().release_all(&reservation.token).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReleased { .. }));
        assert_eq!(stock_of(&db, "a").await, 8);
    }

    #[tokio::test]
    async fn test_release_unknown_token() {
        let db = test_db().await;
        let err = db.ledger().release_all("no-such-token").await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownReservation { .. }));
    }

    #[tokio::test]
    async fn test_release_survives_soft_deleted_medicine() {
        let db = test_db().await;
        seed_medicine(&db, "a", 4).await;

        let reservation = db
            .ledger()
            .reserve_all(&[("a".to_string(), 2)])
            .await
            .unwrap();

        // Soft delete keeps the row, so the credit still lands.
        db.medicines().soft_delete("a").await.unwrap();
        db.ledger().release_all(&reservation.token).await.unwrap();

        assert_eq!(stock_of(&db, "a").await, 4);
    }
}
