//! # Cart
//!
//! The pure cart value type. Nothing here is persisted; both cart storage
//! backends (ephemeral guest map, durable customer table) implement the same
//! rules this type encodes:
//!
//! - one line per medicine; adding the same medicine again merges by
//!   summing quantities, never duplicating the line
//! - quantity is always positive; updates with `qty <= 0` are rejected
//! - no stock checks here; stock may change between cart edit and checkout,
//!   so it is only validated at checkout time by the reservation
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Customer Action           Engine Call             Cart Change          │
//! │  ───────────────           ───────────             ───────────          │
//! │  Add medicine ───────────► cart_add() ───────────► merge or push line  │
//! │  Change quantity ────────► cart_update_quantity()► line.quantity = n   │
//! │  Remove line ────────────► cart_remove() ────────► drop line           │
//! │  Checkout succeeds ──────► clear() ──────────────► lines.clear()       │
//! │                                                                         │
//! │  NOTE: clear() is only ever driven by a successful checkout,           │
//! │        never independently by the cart UI.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::validation::validate_quantity;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// One (medicine, quantity) pair pending purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CartLine {
    pub medicine_id: String,
    pub quantity: i64,
}

/// A customer's (or guest session's) cart.
///
/// ## Invariants
/// - Lines are unique by `medicine_id`
/// - Every quantity is in `1..=MAX_LINE_QUANTITY`
/// - At most `MAX_CART_LINES` distinct lines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Creates a new empty cart.
    pub fn new() -> Self {
        Cart { lines: Vec::new() }
    }

    /// Adds a medicine to the cart, merging into an existing line if present.
    ///
    /// ## Behavior
    /// - Existing line: quantities are summed
    /// - New line: appended, subject to the distinct-line cap
    /// - `qty <= 0` is rejected before anything is touched
    pub fn add_line(&mut self, medicine_id: &str, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.medicine_id == medicine_id) {
            let merged = line.quantity + quantity;
            if merged > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: MAX_LINE_QUANTITY,
                });
            }
            line.quantity = merged;
            return Ok(());
        }

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            });
        }

        self.lines.push(CartLine {
            medicine_id: medicine_id.to_string(),
            quantity,
        });
        Ok(())
    }

    /// Replaces the quantity of an existing line.
    ///
    /// Rejects `qty <= 0`; removing a line is an explicit, separate action.
    pub fn update_quantity(&mut self, medicine_id: &str, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        match self.lines.iter_mut().find(|l| l.medicine_id == medicine_id) {
            Some(line) => {
                line.quantity = quantity;
                Ok(())
            }
            None => Err(CoreError::LineNotInCart {
                medicine_id: medicine_id.to_string(),
            }),
        }
    }

    /// Removes a line from the cart.
    pub fn remove_line(&mut self, medicine_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.medicine_id != medicine_id);

        if self.lines.len() == before {
            return Err(CoreError::LineNotInCart {
                medicine_id: medicine_id.to_string(),
            });
        }
        Ok(())
    }

    /// Clears all lines. Driven only by a successful checkout.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Removes and returns all lines (used by the guest→customer cart merge).
    pub fn drain(&mut self) -> Vec<CartLine> {
        std::mem::take(&mut self.lines)
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total quantity across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_same_medicine() {
        let mut cart = Cart::new();
        cart.add_line("med-1", 2).unwrap();
        cart.add_line("med-1", 3).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_add_rejects_non_positive_quantity() {
        let mut cart = Cart::new();
        assert!(cart.add_line("med-1", 0).is_err());
        assert!(cart.add_line("med-1", -4).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_merge_respects_quantity_cap() {
        let mut cart = Cart::new();
        cart.add_line("med-1", MAX_LINE_QUANTITY).unwrap();

        let err = cart.add_line("med-1", 1).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));
        // Failed merge leaves the line untouched
        assert_eq!(cart.lines()[0].quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_line_cap() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_LINES {
            cart.add_line(&format!("med-{}", i), 1).unwrap();
        }
        let err = cart.add_line("med-overflow", 1).unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_update_quantity() {
        let mut cart = Cart::new();
        cart.add_line("med-1", 2).unwrap();

        cart.update_quantity("med-1", 7).unwrap();
        assert_eq!(cart.lines()[0].quantity, 7);

        assert!(cart.update_quantity("med-1", 0).is_err());
        assert!(cart.update_quantity("med-missing", 1).is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add_line("med-1", 2).unwrap();
        cart.add_line("med-2", 1).unwrap();

        cart.remove_line("med-1").unwrap();
        assert_eq!(cart.line_count(), 1);
        assert!(cart.remove_line("med-1").is_err());

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_drain_empties_cart() {
        let mut cart = Cart::new();
        cart.add_line("med-1", 2).unwrap();

        let lines = cart.drain();
        assert_eq!(lines.len(), 1);
        assert!(cart.is_empty());
    }
}
