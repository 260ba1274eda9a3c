//! # medirun-db: Database Layer for MediRun
//!
//! This crate provides database access for the MediRun ordering platform.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MediRun Data Flow                                │
//! │                                                                         │
//! │  Engine operation (checkout, cancel_order, assign_driver, ...)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     medirun-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (per entity)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Medicine/Cart │    │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │ Order/Rx/...  │    │              │  │   │
//! │  │   └───────────────┘    ├───────────────┤    └──────────────┘  │   │
//! │  │                        │  StockLedger  │ ← sole writer of     │   │
//! │  │                        │  (ledger.rs)  │   stock_on_hand      │   │
//! │  │                        └───────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │                        SQLite Database                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations plus the stock ledger
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medirun_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/medirun.db")).await?;
//! let medicine = db.medicines().get_by_id("uuid-here").await?;
//! let reservation = db.ledger().reserve_all(&[("uuid-here".into(), 2)]).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::delivery::DeliveryRepository;
pub use repository::driver::DriverRepository;
pub use repository::ledger::{LedgerError, Reservation, StockLedger};
pub use repository::medicine::MedicineRepository;
pub use repository::order::OrderRepository;
pub use repository::prescription::PrescriptionRepository;
