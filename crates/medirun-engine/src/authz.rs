//! # Capability-Based Authorization
//!
//! Every engine operation declares the single capability it requires and
//! checks it through [`authorize`]. Roles resolve to a static capability
//! set exactly once; there are no per-operation role string comparisons
//! anywhere else in the codebase.
//!
//! ## Role → Capability Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Role        Capabilities                                               │
//! │  ──────────  ───────────────────────────────────────────────────────    │
//! │  Customer    ManageCart, PlaceOrder, CancelOrder, UploadPrescription   │
//! │  Pharmacist  ReviewPrescription                                        │
//! │  Manager     AssignDriver, ViewCapacity, CancelOrder                   │
//! │  Driver      UpdateDelivery                                            │
//! │  Finance     ViewCapacity                                              │
//! │  Support     CancelOrder, ViewCapacity                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Customers additionally pass an ownership check on their own orders;
//! capability alone never grants access to someone else's order.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Roles
// =============================================================================

/// The six platform roles. Resolved from the session by the host process;
/// opaque to everything below the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Pharmacist,
    Manager,
    Driver,
    Finance,
    Support,
}

// =============================================================================
// Capabilities
// =============================================================================

/// A single permission an operation can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageCart,
    PlaceOrder,
    CancelOrder,
    UploadPrescription,
    ReviewPrescription,
    AssignDriver,
    UpdateDelivery,
    ViewCapacity,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageCart => "manage_cart",
            Capability::PlaceOrder => "place_order",
            Capability::CancelOrder => "cancel_order",
            Capability::UploadPrescription => "upload_prescription",
            Capability::ReviewPrescription => "review_prescription",
            Capability::AssignDriver => "assign_driver",
            Capability::UpdateDelivery => "update_delivery",
            Capability::ViewCapacity => "view_capacity",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Role Resolution
// =============================================================================

/// Resolves a role to its capability set.
///
/// Static data, resolved once per request by [`authorize`].
pub fn capabilities(role: Role) -> &'static [Capability] {
    use Capability::*;

    match role {
        Role::Customer => &[ManageCart, PlaceOrder, CancelOrder, UploadPrescription],
        Role::Pharmacist => &[ReviewPrescription],
        Role::Manager => &[AssignDriver, ViewCapacity, CancelOrder],
        Role::Driver => &[UpdateDelivery],
        Role::Finance => &[ViewCapacity],
        Role::Support => &[CancelOrder, ViewCapacity],
    }
}

// =============================================================================
// Actor
// =============================================================================

/// The authenticated (or guest-session) caller of an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity: customer id, staff id, or guest session token.
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Actor {
            id: id.into(),
            role,
        }
    }
}

/// Checks that the actor's role grants the required capability.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: Capability) -> EngineResult<()> {
    if capabilities(actor.role).contains(&required) {
        Ok(())
    } else {
        Err(EngineError::Forbidden { required })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_capabilities() {
        let actor = Actor::new("42", Role::Customer);
        assert!(authorize(&actor, Capability::PlaceOrder).is_ok());
        assert!(authorize(&actor, Capability::ManageCart).is_ok());
        assert!(authorize(&actor, Capability::AssignDriver).is_err());
        assert!(authorize(&actor, Capability::ReviewPrescription).is_err());
    }

    #[test]
    fn test_staff_role_separation() {
        let pharmacist = Actor::new("p1", Role::Pharmacist);
        assert!(authorize(&pharmacist, Capability::ReviewPrescription).is_ok());
        assert!(authorize(&pharmacist, Capability::AssignDriver).is_err());

        let manager = Actor::new("m1", Role::Manager);
        assert!(authorize(&manager, Capability::AssignDriver).is_ok());
        assert!(authorize(&manager, Capability::UpdateDelivery).is_err());

        let driver = Actor::new("d1", Role::Driver);
        assert!(authorize(&driver, Capability::UpdateDelivery).is_ok());
        assert!(authorize(&driver, Capability::ViewCapacity).is_err());
    }

    #[test]
    fn test_forbidden_names_missing_capability() {
        let finance = Actor::new("f1", Role::Finance);
        let err = authorize(&finance, Capability::CancelOrder).unwrap_err();
        match err {
            EngineError::Forbidden { required } => {
                assert_eq!(required, Capability::CancelOrder);
                assert_eq!(required.to_string(), "cancel_order");
            }
            _ => panic!("expected Forbidden"),
        }
    }
}
