//! # medirun-engine: Order Lifecycle Orchestration
//!
//! The service layer of MediRun. This crate wires the pure rules from
//! `medirun-core` to the storage layer in `medirun-db` and exposes every
//! externally visible operation of the order lifecycle.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Order Lifecycle Data Flow                          │
//! │                                                                         │
//! │  CartStore ──(checkout)──► reserve_all ──► persist order ──► clear     │
//! │                               │                  │                      │
//! │                               │ Insufficient     │ failure              │
//! │                               ▼                  ▼                      │
//! │                      abort, no order     compensating release          │
//! │                                                                         │
//! │  PendingPrescription ──(pharmacist approves)──► Ready                  │
//! │  Ready ──(manager assigns driver)──► Assigned                          │
//! │  Assigned ──► PickedUp ──► InTransit ──► Delivered | Failed            │
//! │  pre-pickup states ──(customer cancels)──► Cancelled                   │
//! │                                                                         │
//! │  Entering Cancelled or Failed credits the reservation back,            │
//! │  exactly once per token.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medirun_db::{Database, DbConfig};
//! use medirun_engine::{Actor, Engine, EngineConfig, Role, telemetry};
//! use medirun_core::Owner;
//!
//! telemetry::init();
//! let db = Database::new(DbConfig::new("medirun.db")).await?;
//! let engine = Engine::new(db, EngineConfig::default());
//!
//! let customer = Actor::new("42", Role::Customer);
//! let owner = Owner::Customer("42".to_string());
//! engine.cart_add(&customer, &owner, "medicine-uuid", 2).await?;
//! let receipt = engine
//!     .checkout(&customer, &owner, "12 High St", "09:00 - 12:00")
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod authz;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod delivery;
pub mod error;
pub mod prescription;
pub mod telemetry;
pub mod workflow;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use authz::{authorize, capabilities, Actor, Capability, Role};
pub use cart::CartStore;
pub use checkout::CheckoutReceipt;
pub use config::EngineConfig;
pub use delivery::CapacitySlot;
pub use error::{EngineError, EngineResult};
pub use prescription::ApprovalOutcome;

use medirun_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// The orchestration facade. One instance per process is typical; cloning
/// is cheap and all state lives in the database or the guest cart store.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    carts: CartStore,
    config: EngineConfig,
}

impl Engine {
    /// Builds an engine over an initialized database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let carts = CartStore::new(db.carts());
        Engine { db, carts, config }
    }

    /// The injected configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct database access, for hosts that need reads beyond the
    /// engine surface (reporting, admin tooling).
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn carts(&self) -> &CartStore {
        &self.carts
    }
}
