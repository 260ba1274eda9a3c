//! # Engine Error Type
//!
//! Unified error type for engine operations.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in MediRun                                │
//! │                                                                         │
//! │  Caller (host process)            Engine                                │
//! │  ─────────────────────            ──────                                │
//! │                                                                         │
//! │  engine.checkout(...)                                                   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Operation: Result<T, EngineError>                               │  │
//! │  │         │                                                        │  │
//! │  │  ValidationError ──► rejected at the boundary, nothing touched  │  │
//! │  │  LedgerError     ──► InsufficientStock with the failing item    │  │
//! │  │  CoreError       ──► InvalidTransition with from/to             │  │
//! │  │  DbError         ──► NotFound stays typed, rest is Persistence  │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Every rejection is a SPECIFIC kind, so the caller can always render   │
//! │  an actionable message ("only 3 units available"), never a generic     │
//! │  failure.                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::authz::Capability;
use medirun_core::{CoreError, OrderStatus, ValidationError};
use medirun_db::{DbError, LedgerError};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One or more checkout lines cannot be reserved. The whole checkout
    /// was aborted; no order exists and the cart is untouched.
    #[error("insufficient stock for {medicine_id}: available {available}, requested {requested}")]
    InsufficientStock {
        medicine_id: String,
        available: i64,
        requested: i64,
    },

    /// The requested order status change violates the transition table
    /// (or lost a concurrent race against another transition).
    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Malformed input, rejected before any state was touched.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown order/prescription/delivery/driver/medicine id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Cart rule violation (line cap, quantity cap).
    #[error("cart error: {0}")]
    Cart(String),

    /// The actor's role does not grant the required capability.
    #[error("forbidden: missing capability '{required}'")]
    Forbidden { required: Capability },

    /// Storage layer failure or timeout.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Creates a not found error.
    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Machine-readable code for programmatic handling by the caller.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Cart(_) => "CART_ERROR",
            EngineError::Forbidden { .. } => "FORBIDDEN",
            EngineError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

/// Converts core domain errors to engine errors.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { order_id, from, to } => {
                EngineError::InvalidTransition { order_id, from, to }
            }
            CoreError::LineNotInCart { medicine_id } => {
                EngineError::not_found("Cart line", &medicine_id)
            }
            CoreError::Validation(e) => EngineError::Validation(e),
            other @ (CoreError::CartTooLarge { .. } | CoreError::QuantityTooLarge { .. }) => {
                EngineError::Cart(other.to_string())
            }
        }
    }
}

/// Converts database errors to engine errors.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => {
                tracing::error!("database failure: {}", other);
                EngineError::Persistence(other.to_string())
            }
        }
    }
}

/// Converts stock ledger errors to engine errors.
impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Insufficient {
                medicine_id,
                available,
                requested,
            } => EngineError::InsufficientStock {
                medicine_id,
                available,
                requested,
            },
            LedgerError::Db(db) => db.into(),
            other => {
                tracing::error!("ledger failure: {}", other);
                EngineError::Persistence(other.to_string())
            }
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================
