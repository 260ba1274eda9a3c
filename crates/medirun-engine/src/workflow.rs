//! # Order Workflow
//!
//! The single writer of order status.
//!
//! Every status change in the system funnels through [`Engine::apply_transition`]:
//! the pure transition table decides legality, a status-guarded UPDATE
//! serializes concurrent writers per order, and entering `Cancelled` or
//! `Failed` credits the stock reservation back exactly once.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      apply_transition(order, next)                      │
//! │                                                                         │
//! │  check_transition(from, next) ──── illegal? → InvalidTransition        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE orders SET status = next                                        │
//! │   WHERE id = ? AND status = from ── 0 rows? → lost the race            │
//! │       │                              → InvalidTransition (fresh from)  │
//! │       ▼                                                                 │
//! │  next ∈ {Cancelled, Failed}?                                           │
//! │       └── release_all(reservation_token)                               │
//! │           (AlreadyReleased is tolerated: the guarded transition        │
//! │            fired once, so a duplicate release only means a retry       │
//! │            after a crash; stock was credited the first time)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info, warn};

use crate::authz::{authorize, Actor, Capability, Role};
use crate::error::{EngineError, EngineResult};
use crate::Engine;
use medirun_core::validation::validate_uuid;
use medirun_core::{check_transition, Order, OrderStatus, Owner};
use medirun_db::LedgerError;

/// Customers only ever act on what they own; staff roles skip this.
/// `owner_ref` is the persisted `customer:<id>` / `guest:<token>` form.
pub(crate) fn ensure_owner(actor: &Actor, owner_ref: &str) -> EngineResult<()> {
    let owner = Owner::parse(owner_ref).map_err(EngineError::Validation)?;
    let owner_id = match owner {
        Owner::Customer(id) | Owner::Guest(id) => id,
    };

    if owner_id == actor.id {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            required: Capability::CancelOrder,
        })
    }
}

impl Engine {
    /// Cancels an order.
    ///
    /// Allowed while the order has not been picked up
    /// (`PendingPrescription`, `Ready`, `Assigned`); anything else is an
    /// `InvalidTransition`. Reserved stock is credited back exactly once.
    pub async fn cancel_order(&self, actor: &Actor, order_id: &str) -> EngineResult<()> {
        authorize(actor, Capability::CancelOrder)?;
        validate_uuid("order id", order_id).map_err(EngineError::Validation)?;

        let order = self
            .database()
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;

        if actor.role == Role::Customer {
            ensure_owner(actor, &order.owner_ref)?;
        }

        self.apply_transition(&order, OrderStatus::Cancelled).await?;

        // An Assigned order already has a delivery leg; terminate it so the
        // driver's derived load drops with the cancellation.
        if self
            .database()
            .deliveries()
            .void_for_order(&order.id, "order cancelled")
            .await?
        {
            debug!(order_id = %order.id, "Delivery leg voided by cancellation");
        }

        info!(order_id = %order.id, order_number = %order.order_number, actor = %actor.id, "Order cancelled");
        Ok(())
    }

    /// Orders awaiting delivery assignment (manager planning view).
    pub async fn ready_orders(&self, actor: &Actor) -> EngineResult<Vec<Order>> {
        authorize(actor, Capability::AssignDriver)?;
        Ok(self
            .database()
            .orders()
            .list_by_status(OrderStatus::Ready)
            .await?)
    }

    /// Applies one status transition for `order`.
    ///
    /// `order.status` is the expected current status; if a concurrent
    /// transition got there first the guarded UPDATE misses and this
    /// reports `InvalidTransition` with the freshest status it can read.
    pub(crate) async fn apply_transition(
        &self,
        order: &Order,
        next: OrderStatus,
    ) -> EngineResult<()> {
        check_transition(&order.id, order.status, next)?;

        let applied = self
            .database()
            .orders()
            .update_status(&order.id, order.status, next)
            .await?;

        if !applied {
            let current = self
                .database()
                .orders()
                .get_by_id(&order.id)
                .await?
                .map(|o| o.status)
                .unwrap_or(order.status);

            return Err(EngineError::InvalidTransition {
                order_id: order.id.clone(),
                from: current,
                to: next,
            });
        }

        info!(order_id = %order.id, from = %order.status, to = %next, "Order status transition");

        if matches!(next, OrderStatus::Cancelled | OrderStatus::Failed) {
            self.release_order_stock(order).await?;
        }

        Ok(())
    }

    /// Credits the order's reservation back (on cancellation/failure).
    async fn release_order_stock(&self, order: &Order) -> EngineResult<()> {
        let Some(token) = &order.reservation_token else {
            // Placeholder orders created by prescription approval never
            // reserved anything.
            debug!(order_id = %order.id, "No reservation to release");
            return Ok(());
        };

        match self.database().ledger().release_all(token).await {
            Ok(()) => Ok(()),
            Err(LedgerError::AlreadyReleased { .. }) => {
                warn!(order_id = %order.id, token = %token, "Reservation already released, skipping");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        customer, customer_owner, engine_with_catalog, manager, stock_of,
    };
    use uuid::Uuid;

    #[tokio::test]
    async fn test_cancel_restores_stock_round_trip() {
        let engine = engine_with_catalog().await;
        let actor = customer();
        let owner = customer_owner();

        // Two lines with quantities {3, 5}.
        engine.cart_add(&actor, &owner, "med-a", 3).await.unwrap();
        engine.cart_add(&actor, &owner, "med-b", 5).await.unwrap();
        // med-b requires a prescription, so the order starts gated; the
        // reservation is taken either way.
        let receipt = engine
            .checkout(&actor, &owner, "12 High St", "09:00 - 12:00")
            .await
            .unwrap();

        assert_eq!(stock_of(&engine, "med-a").await, 7);
        assert_eq!(stock_of(&engine, "med-b").await, 0);

        engine.cancel_order(&actor, &receipt.order_id).await.unwrap();

        // Post-cancel stock equals pre-checkout stock for both items.
        assert_eq!(stock_of(&engine, "med-a").await, 10);
        assert_eq!(stock_of(&engine, "med-b").await, 5);

        let order = engine
            .database()
            .orders()
            .get_by_id(&receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, medirun_core::OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_terminal_and_releases_once() {
        let engine = engine_with_catalog().await;
        let actor = customer();
        let owner = customer_owner();

        engine.cart_add(&actor, &owner, "med-a", 4).await.unwrap();
        let receipt = engine
            .checkout(&actor, &owner, "12 High St", "09:00 - 12:00")
            .await
            .unwrap();

        engine.cancel_order(&actor, &receipt.order_id).await.unwrap();
        assert_eq!(stock_of(&engine, "med-a").await, 10);

        // A second cancellation is an InvalidTransition and must not
        // credit stock again.
        let err = engine
            .cancel_order(&actor, &receipt.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(stock_of(&engine, "med-a").await, 10);
    }

    #[tokio::test]
    async fn test_customer_cannot_cancel_foreign_order() {
        let engine = engine_with_catalog().await;
        let actor = customer();
        let owner = customer_owner();

        engine.cart_add(&actor, &owner, "med-a", 1).await.unwrap();
        let receipt = engine
            .checkout(&actor, &owner, "12 High St", "09:00 - 12:00")
            .await
            .unwrap();

        let stranger = Actor::new("99", Role::Customer);
        let err = engine
            .cancel_order(&stranger, &receipt.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));

        // Support staff may cancel on the customer's behalf.
        let support = Actor::new("s-1", Role::Support);
        engine.cancel_order(&support, &receipt.order_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_assigned_order_voids_delivery() {
        let engine = engine_with_catalog().await;
        crate::test_support::seed_driver(&engine, "d-1", true).await;

        let actor = customer();
        let owner = customer_owner();
        engine.cart_add(&actor, &owner, "med-a", 2).await.unwrap();
        let receipt = engine
            .checkout(&actor, &owner, "12 High St", "09:00 - 12:00")
            .await
            .unwrap();

        engine
            .assign_driver(&manager(), &receipt.order_id, "d-1")
            .await
            .unwrap();
        assert_eq!(engine.driver_load(&manager(), "d-1").await.unwrap(), 1);

        // Cancellation before pickup is allowed and frees the driver.
        engine.cancel_order(&actor, &receipt.order_id).await.unwrap();
        assert_eq!(engine.driver_load(&manager(), "d-1").await.unwrap(), 0);
        assert_eq!(stock_of(&engine, "med-a").await, 10);
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let engine = engine_with_catalog().await;
        let missing = Uuid::new_v4().to_string();

        let err = engine.cancel_order(&customer(), &missing).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_ready_orders_requires_capability() {
        let engine = engine_with_catalog().await;

        assert!(engine.ready_orders(&manager()).await.unwrap().is_empty());
        assert!(matches!(
            engine.ready_orders(&customer()).await.unwrap_err(),
            EngineError::Forbidden { .. }
        ));
    }
}
