//! # Checkout
//!
//! Turns a cart into a confirmed order.
//!
//! ## The Critical Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        checkout(owner, ...)                             │
//! │                                                                         │
//! │  1. validate address/window, load cart ── empty? → Validation          │
//! │  2. load catalog rows, freeze prices ──── missing? → NotFound          │
//! │  3. ledger.reserve_all(lines)                                           │
//! │        └── Insufficient? → abort: NO order, cart UNTOUCHED             │
//! │  4. persist order + lines (one transaction)                            │
//! │        └── failure? → compensating release_all, then error             │
//! │           (a reservation is never orphaned)                            │
//! │  5. clear cart ── only AFTER persistence, so a crash between 3 and 5   │
//! │                   can lose at most the clear, never the cart           │
//! │                                                                         │
//! │  Initial status: PendingPrescription if any line requires a            │
//! │  prescription, Ready otherwise.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::authz::{authorize, Actor, Capability};
use crate::error::{EngineError, EngineResult};
use crate::Engine;
use medirun_core::validation::{require_text, validate_delivery_window};
use medirun_core::{Medicine, Money, Order, OrderLine, OrderStatus, Owner, ValidationError};

// =============================================================================
// Result DTO
// =============================================================================

/// What the caller gets back from a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub weight_grams: i64,
    pub line_count: usize,
}

/// Short human-readable order number, e.g. `ORD-9F2C41AB`.
pub(crate) fn generate_order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}

// =============================================================================
// Checkout
// =============================================================================

impl Engine {
    /// Converts the owner's cart into an order.
    ///
    /// ## Returns
    /// * `Ok(CheckoutReceipt)` - order persisted, stock reserved, cart
    ///   cleared
    /// * `Err(InsufficientStock)` - nothing happened; the error names the
    ///   failing medicine and what is actually available
    pub async fn checkout(
        &self,
        actor: &Actor,
        owner: &Owner,
        delivery_address: &str,
        delivery_window: &str,
    ) -> EngineResult<CheckoutReceipt> {
        authorize(actor, Capability::PlaceOrder)?;

        let delivery_address =
            require_text("delivery address", delivery_address).map_err(EngineError::Validation)?;
        let delivery_window =
            validate_delivery_window(delivery_window).map_err(EngineError::Validation)?;

        let cart_lines = self.carts().lines(owner).await?;
        if cart_lines.is_empty() {
            return Err(EngineError::Validation(ValidationError::Required {
                field: "cart".to_string(),
            }));
        }

        // Load catalog rows up front: prices are frozen from what the
        // catalog says NOW, and gone/retired medicines fail the checkout
        // before anything is reserved.
        let mut catalog: Vec<Medicine> = Vec::with_capacity(cart_lines.len());
        for line in &cart_lines {
            let medicine = self
                .database()
                .medicines()
                .get_by_id(&line.medicine_id)
                .await?
                .filter(|m| m.is_active)
                .ok_or_else(|| EngineError::not_found("Medicine", &line.medicine_id))?;
            catalog.push(medicine);
        }

        let reserve_lines: Vec<(String, i64)> = cart_lines
            .iter()
            .map(|l| (l.medicine_id.clone(), l.quantity))
            .collect();

        // All-or-nothing: on Insufficient the ledger mutated nothing and
        // we abort with the cart intact.
        let reservation = self.database().ledger().reserve_all(&reserve_lines).await?;

        let order_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let lines: Vec<OrderLine> = cart_lines
            .iter()
            .zip(&catalog)
            .enumerate()
            .map(|(idx, (cart_line, medicine))| OrderLine {
                order_id: order_id.clone(),
                line_no: (idx + 1) as i64,
                medicine_id: cart_line.medicine_id.clone(),
                quantity: cart_line.quantity,
                unit_price_cents: medicine.unit_price_cents,
            })
            .collect();

        let total: Money = lines.iter().map(|l| l.line_total()).sum();
        let total_quantity: i64 = lines.iter().map(|l| l.quantity).sum();
        let requires_prescription = catalog.iter().any(|m| m.requires_prescription);

        let status = if requires_prescription {
            OrderStatus::PendingPrescription
        } else {
            OrderStatus::Ready
        };

        let order = Order {
            id: order_id.clone(),
            order_number: generate_order_number(),
            owner_ref: owner.to_string(),
            status,
            delivery_address,
            delivery_window,
            weight_grams: total_quantity * self.config().unit_weight_grams,
            total_cents: total.cents(),
            reservation_token: Some(reservation.token.clone()),
            created_at: now,
            updated_at: now,
        };

        if let Err(persist_err) = self.database().orders().insert_with_lines(&order, &lines).await {
            // Compensate: the reservation must not outlive a failed
            // persistence.
            warn!(order_id = %order.id, "Order persistence failed, releasing reservation");
            if let Err(release_err) = self.database().ledger().release_all(&reservation.token).await
            {
                error!(
                    token = %reservation.token,
                    error = %release_err,
                    "Compensating release failed, reservation is orphaned"
                );
            }
            return Err(persist_err.into());
        }

        // Clearing after persistence: a crash right here costs a stale
        // cart, never a paid-for order.
        if let Err(err) = self.carts().clear(owner).await {
            warn!(owner = %owner, error = %err, "Cart clear after checkout failed");
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            status = %order.status,
            total = %order.total(),
            lines = lines.len(),
            "Checkout complete"
        );

        Ok(CheckoutReceipt {
            order_id,
            order_number: order.order_number,
            status,
            total_cents: order.total_cents,
            weight_grams: order.weight_grams,
            line_count: lines.len(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
