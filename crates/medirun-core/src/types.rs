//! # Domain Types
//!
//! Core domain types used throughout MediRun, plus the order status state
//! machine that governs the whole order lifecycle.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Medicine     │   │     Order       │   │  Prescription   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  stock_on_hand  │   │  order_number   │   │  order_id (FK?) │       │
//! │  │  requires_rx    │   │  status         │   │  status         │       │
//! │  │  price (cents)  │   │  frozen lines   │   │  rejection      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │    Delivery     │   │     Driver      │                             │
//! │  │  1:1 with order │   │  load derived,  │                             │
//! │  │  proof fields   │   │  never stored   │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order Status State Machine
//! ```text
//!                    ┌──────────────────────┐
//!   (rx lines) ─────►│ PendingPrescription  │────────────┐
//!                    └──────────┬───────────┘            │
//!                               │ approve                │ cancel / reject
//!                               ▼                        ▼
//!   (no rx) ────────►┌──────────────────┐        ┌─────────────┐
//!                    │      Ready       │───────►│  Cancelled  │ (terminal)
//!                    └──────────┬───────┘ cancel └─────────────┘
//!                               │ assign                 ▲
//!                               ▼                        │ cancel
//!                    ┌──────────────────┐────────────────┘
//!                    │     Assigned     │
//!                    └──────────┬───────┘
//!                               │ pickup
//!                               ▼
//!                    ┌──────────────────┐
//!                    │     PickedUp     │
//!                    └──────────┬───────┘
//!                               │ depart
//!                               ▼
//!                    ┌──────────────────┐  issue  ┌─────────────┐
//!                    │    InTransit     │────────►│   Failed    │ (terminal)
//!                    └──────────┬───────┘         └─────────────┘
//!                               │ proof of delivery
//!                               ▼
//!                    ┌──────────────────┐
//!                    │    Delivered     │ (terminal)
//!                    └──────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Owner Reference
// =============================================================================

/// Who owns a cart or an order: an authenticated customer or a guest session.
///
/// Rendered as `customer:<id>` / `guest:<token>` when persisted, so a single
/// TEXT column can hold either kind without a discriminator column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Owner {
    /// Authenticated customer (durable cart storage).
    Customer(String),
    /// Guest browsing session (ephemeral cart storage).
    Guest(String),
}

impl Owner {
    /// Parses the persisted `kind:id` form back into an owner reference.
    pub fn parse(s: &str) -> Result<Owner, ValidationError> {
        match s.split_once(':') {
            Some(("customer", id)) if !id.is_empty() => Ok(Owner::Customer(id.to_string())),
            Some(("guest", token)) if !token.is_empty() => Ok(Owner::Guest(token.to_string())),
            _ => Err(ValidationError::InvalidFormat {
                field: "owner".to_string(),
                reason: "expected customer:<id> or guest:<token>".to_string(),
            }),
        }
    }

    /// True for authenticated customers (selects the durable cart backend).
    pub fn is_customer(&self) -> bool {
        matches!(self, Owner::Customer(_))
    }
}

impl core::fmt::Display for Owner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Owner::Customer(id) => write!(f, "customer:{}", id),
            Owner::Guest(token) => write!(f, "guest:{}", token),
        }
    }
}

// =============================================================================
// Medicine
// =============================================================================

/// A catalog medicine available for ordering.
///
/// `stock_on_hand` is owned by the stock ledger; nothing else in the system
/// may write it. Deletion is soft (`is_active = false`) so historical order
/// lines and pending releases keep a valid target row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Medicine {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Optional catalog category (e.g. "Painkillers").
    pub category: Option<String>,

    /// Price in cents (smallest currency unit).
    pub unit_price_cents: i64,

    /// Current stock level. Never negative, at every observable point.
    pub stock_on_hand: i64,

    /// Whether a pharmacist must approve a prescription before delivery.
    pub requires_prescription: bool,

    /// Whether the medicine is orderable (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    /// Returns the price as a Money value.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order, driven by the multi-party state machine.
///
/// The only authority on which transitions are legal is
/// [`OrderStatus::can_transition_to`]; everything else (the engine, the
/// status-guarded SQL updates) enforces what this table says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created with prescription-only lines; blocked until approval.
    PendingPrescription,
    /// Reserved and ready for delivery assignment.
    Ready,
    /// A driver has been assigned.
    Assigned,
    /// The driver collected the parcel.
    PickedUp,
    /// On the way to the customer.
    InTransit,
    /// Confirmed delivered with proof. Terminal.
    Delivered,
    /// The driver reported an unrecoverable issue. Terminal.
    Failed,
    /// Cancelled before pickup. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Stable string form, identical to the persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPrescription => "pending_prescription",
            OrderStatus::Ready => "ready",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states permit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// The transition table.
    ///
    /// Anything this function rejects must surface as `InvalidTransition`,
    /// no matter which party asked.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (PendingPrescription, Ready)
                | (PendingPrescription, Cancelled)
                | (Ready, Assigned)
                | (Ready, Cancelled)
                | (Assigned, PickedUp)
                | (Assigned, Cancelled)
                | (PickedUp, InTransit)
                | (InTransit, Delivered)
                | (InTransit, Failed)
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks a single status transition against the table.
///
/// ## Returns
/// * `Ok(())` - the transition is legal
/// * `Err(CoreError::InvalidTransition)` - anything else, including any
///   transition out of a terminal state
pub fn check_transition(order_id: &str, from: OrderStatus, to: OrderStatus) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            order_id: order_id.to_string(),
            from,
            to,
        })
    }
}

// =============================================================================
// Order
// =============================================================================

/// A confirmed order. Created only through a successful checkout (or as a
/// placeholder by prescription approval); mutated only through the allowed
/// transitions; immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,

    /// Short human-readable number shown to customers and drivers.
    pub order_number: String,

    /// Persisted owner reference (`customer:<id>` or `guest:<token>`).
    pub owner_ref: String,

    pub status: OrderStatus,

    pub delivery_address: String,

    /// Requested delivery time window, e.g. "09:00 - 12:00".
    pub delivery_window: String,

    /// Total shipment weight, derived from line quantities at checkout.
    pub weight_grams: i64,

    /// Total order cost in cents, frozen at checkout.
    pub total_cents: i64,

    /// Stock reservation token backing this order. `None` only for
    /// placeholder orders that never reserved stock.
    pub reservation_token: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the frozen order total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line of an order. Unit price is frozen at commit time and never
/// recomputed from the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub order_id: String,
    pub line_no: i64,
    pub medicine_id: String,
    pub quantity: i64,
    /// Catalog price at checkout time (frozen).
    pub unit_price_cents: i64,
}

impl OrderLine {
    /// Returns the frozen unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Line total (frozen unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price() * self.quantity
    }
}

// =============================================================================
// Prescription
// =============================================================================

/// Review status of an uploaded prescription document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Pending,
    Approved,
    Rejected,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Approved => "approved",
            PrescriptionStatus::Rejected => "rejected",
        }
    }
}

/// An uploaded prescription document and its review state.
///
/// A rejected prescription may be re-uploaded by the customer, which resets
/// it to `Pending` without creating a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Prescription {
    pub id: String,

    /// Linked order, if one exists yet (1:1 once linked).
    pub order_id: Option<String>,

    pub owner_ref: String,

    /// Opaque reference into the external file store.
    pub file_ref: String,

    pub status: PrescriptionStatus,

    /// Mandatory when status is `Rejected`.
    pub rejection_reason: Option<String>,

    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Delivery
// =============================================================================

/// Delivery leg status. Mirrors the tail of the order state machine; the
/// order row remains the single source of truth for lifecycle decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    /// Completed legs no longer count towards a driver's load.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

/// A delivery record, 1:1 with an order once a driver is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Delivery {
    pub id: String,
    pub order_id: String,
    pub driver_id: String,
    pub status: DeliveryStatus,

    /// Free-form ETA shown to the customer, e.g. "15 min".
    pub eta: Option<String>,

    /// Driver notes; on failure holds the reported issue.
    pub notes: Option<String>,

    /// Proof of delivery: who accepted the parcel.
    pub recipient_name: Option<String>,

    /// Proof of delivery: reference into the external file store.
    pub proof_ref: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Driver
// =============================================================================

/// A delivery driver.
///
/// `current_load` is intentionally absent: it is always derived by counting
/// the driver's non-terminal deliveries, so it can never drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub service_area: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [OrderStatus; 8] = [
        OrderStatus::PendingPrescription,
        OrderStatus::Ready,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_terminal_states_allow_nothing() {
        for from in ALL_STATUSES {
            if !from.is_terminal() {
                continue;
            }
            for to in ALL_STATUSES {
                assert!(
                    !from.can_transition_to(to),
                    "{} -> {} must be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_transition_table_exact() {
        use OrderStatus::*;

        let allowed = [
            (PendingPrescription, Ready),
            (PendingPrescription, Cancelled),
            (Ready, Assigned),
            (Ready, Cancelled),
            (Assigned, PickedUp),
            (Assigned, Cancelled),
            (PickedUp, InTransit),
            (InTransit, Delivered),
            (InTransit, Failed),
        ];

        for from in ALL_STATUSES {
            for to in ALL_STATUSES {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "table mismatch for {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_delivered_requires_full_path() {
        use OrderStatus::*;

        // The only way into Delivered is InTransit, the only way into
        // InTransit is PickedUp, and the only way into PickedUp is Assigned.
        for from in ALL_STATUSES {
            assert_eq!(from.can_transition_to(Delivered), from == InTransit);
            assert_eq!(from.can_transition_to(InTransit), from == PickedUp);
            assert_eq!(from.can_transition_to(PickedUp), from == Assigned);
        }
    }

    #[test]
    fn test_check_transition_error_payload() {
        let err = check_transition("ord-9", OrderStatus::Delivered, OrderStatus::Ready)
            .unwrap_err();
        match err {
            CoreError::InvalidTransition { order_id, from, to } => {
                assert_eq!(order_id, "ord-9");
                assert_eq!(from, OrderStatus::Delivered);
                assert_eq!(to, OrderStatus::Ready);
            }
            _ => panic!("expected InvalidTransition"),
        }
    }

    #[test]
    fn test_owner_round_trip() {
        let customer = Owner::Customer("42".to_string());
        assert_eq!(customer.to_string(), "customer:42");
        assert_eq!(Owner::parse("customer:42").unwrap(), customer);

        let guest = Owner::Guest("sess-abc".to_string());
        assert_eq!(guest.to_string(), "guest:sess-abc");
        assert_eq!(Owner::parse("guest:sess-abc").unwrap(), guest);
        assert!(!guest.is_customer());

        assert!(Owner::parse("admin:1").is_err());
        assert!(Owner::parse("customer:").is_err());
        assert!(Owner::parse("guest").is_err());
    }

    #[test]
    fn test_order_line_totals() {
        let line = OrderLine {
            order_id: "o".to_string(),
            line_no: 1,
            medicine_id: "m".to_string(),
            quantity: 3,
            unit_price_cents: 450,
        };
        assert_eq!(line.unit_price().cents(), 450);
        assert_eq!(line.line_total().cents(), 1350);
    }
}
