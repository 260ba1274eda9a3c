//! # Validation Module
//!
//! Input validation utilities shared by the engine boundary.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Engine boundary (this module)                                │
//! │  ├── Quantity, id format, required text fields                         │
//! │  └── Rejected BEFORE the stock ledger or state machine is touched      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Domain rules (cart, transition table)                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock_on_hand >= 0), CHECK (quantity > 0)                  │
//! │  └── UNIQUE / FK constraints                                           │
//! │                                                                         │
//! │  Defense in depth: each layer catches what the one above missed        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MAX_LINE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart/order line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required free-text field (address, rejection reason, ...).
///
/// ## Returns
/// The trimmed value on success.
pub fn require_text(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 500 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 500,
        });
    }

    Ok(value.to_string())
}

/// Validates a delivery time window, e.g. "09:00 - 12:00".
///
/// Windows are opaque labels to this subsystem (slot planning groups by the
/// literal string); only presence and length are enforced here.
pub fn validate_delivery_window(window: &str) -> ValidationResult<String> {
    let window = window.trim();

    if window.is_empty() {
        return Err(ValidationError::Required {
            field: "delivery window".to_string(),
        });
    }

    if window.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "delivery window".to_string(),
            max: 50,
        });
    }

    Ok(window.to_string())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use medirun_core::validation::validate_uuid;
///
/// assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
