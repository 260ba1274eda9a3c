//! # Driver Repository
//!
//! Database operations for delivery drivers. Deliberately small: driver
//! load is derived in the delivery repository, never stored here.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use medirun_core::Driver;

const DRIVER_COLUMNS: &str = "id, name, service_area, available, created_at";

/// Repository for driver database operations.
#[derive(Debug, Clone)]
pub struct DriverRepository {
    pool: SqlitePool,
}

impl DriverRepository {
    /// Creates a new DriverRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DriverRepository { pool }
    }

    /// Inserts a new driver.
    pub async fn insert(&self, driver: &Driver) -> DbResult<()> {
        debug!(id = %driver.id, name = %driver.name, "Inserting driver");

        sqlx::query(
            r#"
            INSERT INTO drivers (id, name, service_area, available, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&driver.id)
        .bind(&driver.name)
        .bind(&driver.service_area)
        .bind(driver.available)
        .bind(driver.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a driver by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Driver>> {
        let driver = sqlx::query_as::<_, Driver>(&format!(
            "SELECT {} FROM drivers WHERE id = ?1",
            DRIVER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(driver)
    }

    /// Lists drivers currently accepting assignments.
    pub async fn list_available(&self) -> DbResult<Vec<Driver>> {
        let drivers = sqlx::query_as::<_, Driver>(&format!(
            "SELECT {} FROM drivers WHERE available = 1 ORDER BY name",
            DRIVER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(drivers)
    }

    /// Toggles a driver's availability.
    pub async fn set_availability(&self, id: &str, available: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE drivers SET available = ?2 WHERE id = ?1")
            .bind(id)
            .bind(available)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Driver", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
