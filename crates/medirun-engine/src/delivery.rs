//! # Delivery Assignment & Tracking
//!
//! Manager-side assignment, driver-side progress reporting, and the
//! advisory capacity view.
//!
//! ## Delivery Leg
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  assign(order, driver)      order: Ready ──► Assigned                  │
//! │        │                    delivery row created (1:1 with order)      │
//! │        ▼                                                                │
//! │  start_delivery             Assigned ──► PickedUp ──► InTransit        │
//! │        │                    (one driver action, two modeled steps;     │
//! │        ▼                     a crash between them resumes cleanly)     │
//! │  mark_delivered             InTransit ──► Delivered  (with proof)      │
//! │  report_issue               InTransit ──► Failed     (stock released)  │
//! │                                                                         │
//! │  The ORDER transition is applied first and is the gate; the delivery   │
//! │  row follows. An order can therefore never reach Delivered without     │
//! │  having passed through Assigned and InTransit.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz::{authorize, Actor, Capability};
use crate::error::{EngineError, EngineResult};
use crate::Engine;
use medirun_core::validation::{require_text, validate_uuid};
use medirun_core::{Delivery, DeliveryStatus, Driver, OrderStatus, ValidationError};

// =============================================================================
// Capacity View DTO
// =============================================================================

/// One (delivery window, driver) group of the capacity report.
///
/// Advisory only: over-capacity assignment is still permitted; planners use
/// this to spread load across windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySlot {
    pub window: String,
    pub driver_id: String,
    pub driver_name: String,
    pub order_count: i64,
    pub capacity_percent: u32,
}

// =============================================================================
// Delivery Operations
// =============================================================================

impl Engine {
    /// Assigns a driver to a ready order and opens the delivery leg.
    ///
    /// ## Returns
    /// The new delivery id.
    pub async fn assign_driver(
        &self,
        actor: &Actor,
        order_id: &str,
        driver_id: &str,
    ) -> EngineResult<String> {
        authorize(actor, Capability::AssignDriver)?;
        validate_uuid("order id", order_id).map_err(EngineError::Validation)?;

        let order = self
            .database()
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;

        let driver = self
            .database()
            .drivers()
            .get_by_id(driver_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Driver", driver_id))?;

        self.ensure_assignable(&driver).await?;

        // Ready → Assigned; a PendingPrescription order fails here with
        // InvalidTransition, which is the prescription gate doing its job.
        self.apply_transition(&order, OrderStatus::Assigned).await?;

        let now = Utc::now();
        let delivery = Delivery {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            driver_id: driver.id.clone(),
            status: DeliveryStatus::Assigned,
            eta: None,
            notes: None,
            recipient_name: None,
            proof_ref: None,
            created_at: now,
            updated_at: now,
        };

        self.database().deliveries().insert(&delivery).await?;

        info!(
            order_id = %order.id,
            driver_id = %driver.id,
            delivery_id = %delivery.id,
            "Driver assigned"
        );
        Ok(delivery.id)
    }

    /// Driver picks up and departs: `Assigned → PickedUp → InTransit`.
    ///
    /// One driver action, but two guarded transitions: a failure between
    /// them leaves the order in `PickedUp`, from which a retry resumes.
    pub async fn start_delivery(&self, actor: &Actor, delivery_id: &str) -> EngineResult<()> {
        authorize(actor, Capability::UpdateDelivery)?;
        validate_uuid("delivery id", delivery_id).map_err(EngineError::Validation)?;

        let delivery = self.load_delivery(delivery_id).await?;

        let order = self.load_order(&delivery.order_id).await?;
        self.apply_transition(&order, OrderStatus::PickedUp).await?;
        self.step_delivery(&delivery.id, DeliveryStatus::Assigned, DeliveryStatus::PickedUp)
            .await?;

        let order = self.load_order(&delivery.order_id).await?;
        self.apply_transition(&order, OrderStatus::InTransit).await?;
        self.step_delivery(&delivery.id, DeliveryStatus::PickedUp, DeliveryStatus::InTransit)
            .await?;

        info!(delivery_id = %delivery.id, order_id = %delivery.order_id, "Delivery started");
        Ok(())
    }

    /// Driver confirms delivery with proof.
    pub async fn mark_delivered(
        &self,
        actor: &Actor,
        delivery_id: &str,
        recipient_name: &str,
        proof_ref: &str,
    ) -> EngineResult<()> {
        authorize(actor, Capability::UpdateDelivery)?;
        validate_uuid("delivery id", delivery_id).map_err(EngineError::Validation)?;
        let recipient_name =
            require_text("recipient name", recipient_name).map_err(EngineError::Validation)?;
        let proof_ref = require_text("proof reference", proof_ref).map_err(EngineError::Validation)?;

        let delivery = self.load_delivery(delivery_id).await?;
        let order = self.load_order(&delivery.order_id).await?;

        self.apply_transition(&order, OrderStatus::Delivered).await?;

        if !self
            .database()
            .deliveries()
            .mark_delivered(&delivery.id, &recipient_name, &proof_ref)
            .await?
        {
            warn!(delivery_id = %delivery.id, "Delivery row drifted from order status");
        }

        info!(delivery_id = %delivery.id, order_id = %order.id, recipient = %recipient_name, "Delivered");
        Ok(())
    }

    /// Driver reports an unrecoverable issue: order and delivery fail, and
    /// the order's reserved stock is credited back.
    pub async fn report_issue(
        &self,
        actor: &Actor,
        delivery_id: &str,
        issue_type: &str,
        description: &str,
    ) -> EngineResult<()> {
        authorize(actor, Capability::UpdateDelivery)?;
        validate_uuid("delivery id", delivery_id).map_err(EngineError::Validation)?;
        let issue_type = require_text("issue type", issue_type).map_err(EngineError::Validation)?;
        let description =
            require_text("issue description", description).map_err(EngineError::Validation)?;

        let delivery = self.load_delivery(delivery_id).await?;
        let order = self.load_order(&delivery.order_id).await?;

        // InTransit → Failed releases the reservation (workflow side effect).
        self.apply_transition(&order, OrderStatus::Failed).await?;

        let notes = format!("{}: {}", issue_type, description);
        if !self
            .database()
            .deliveries()
            .mark_failed(&delivery.id, &notes)
            .await?
        {
            warn!(delivery_id = %delivery.id, "Delivery row drifted from order status");
        }

        info!(delivery_id = %delivery.id, order_id = %order.id, issue = %issue_type, "Delivery failed");
        Ok(())
    }

    /// Updates the customer-facing ETA for a delivery.
    pub async fn update_eta(&self, actor: &Actor, delivery_id: &str, eta: &str) -> EngineResult<()> {
        authorize(actor, Capability::UpdateDelivery)?;
        validate_uuid("delivery id", delivery_id).map_err(EngineError::Validation)?;
        let eta = require_text("eta", eta).map_err(EngineError::Validation)?;

        if !self.database().deliveries().set_eta(delivery_id, &eta).await? {
            return Err(EngineError::not_found("Delivery", delivery_id));
        }
        Ok(())
    }

    /// Read-only capacity projection for planning.
    ///
    /// Groups active deliveries by (delivery window, driver) and reports
    /// `capacity_percent = min(100, round(count * 100 / max_orders_per_slot))`.
    pub async fn capacity_view(&self, actor: &Actor) -> EngineResult<Vec<CapacitySlot>> {
        authorize(actor, Capability::ViewCapacity)?;

        let rows = self.database().deliveries().active_slots().await?;
        let max_per_slot = self.config().max_orders_per_slot.max(1);

        // BTreeMap keeps the report deterministic: by window, then driver.
        let mut groups: BTreeMap<(String, String), (String, i64)> = BTreeMap::new();
        for row in rows {
            let entry = groups
                .entry((row.delivery_window, row.driver_id))
                .or_insert((row.driver_name, 0));
            entry.1 += 1;
        }

        let slots = groups
            .into_iter()
            .map(|((window, driver_id), (driver_name, count))| {
                let percent = ((count as f64) * 100.0 / (max_per_slot as f64)).round() as u32;
                CapacitySlot {
                    window,
                    driver_id,
                    driver_name,
                    order_count: count,
                    capacity_percent: percent.min(100),
                }
            })
            .collect();

        Ok(slots)
    }

    /// Derived load of one driver (count of non-terminal deliveries).
    pub async fn driver_load(&self, actor: &Actor, driver_id: &str) -> EngineResult<i64> {
        authorize(actor, Capability::AssignDriver)?;
        Ok(self
            .database()
            .deliveries()
            .count_active_for_driver(driver_id)
            .await?)
    }

    /// Drivers currently accepting assignments (manager picker).
    pub async fn available_drivers(&self, actor: &Actor) -> EngineResult<Vec<Driver>> {
        authorize(actor, Capability::AssignDriver)?;
        Ok(self.database().drivers().list_available().await?)
    }

    /// Driver availability toggle.
    pub async fn set_driver_availability(
        &self,
        actor: &Actor,
        driver_id: &str,
        available: bool,
    ) -> EngineResult<()> {
        authorize(actor, Capability::UpdateDelivery)?;
        self.database()
            .drivers()
            .set_availability(driver_id, available)
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn ensure_assignable(&self, driver: &Driver) -> EngineResult<()> {
        if !driver.available {
            return Err(EngineError::Validation(ValidationError::NotAllowed {
                field: "driver".to_string(),
                allowed: vec!["available".to_string()],
            }));
        }

        let load = self
            .database()
            .deliveries()
            .count_active_for_driver(&driver.id)
            .await?;
        if load >= self.config().max_driver_load {
            return Err(EngineError::Validation(ValidationError::OutOfRange {
                field: "driver load".to_string(),
                min: 0,
                max: self.config().max_driver_load,
            }));
        }

        Ok(())
    }

    async fn load_delivery(&self, delivery_id: &str) -> EngineResult<Delivery> {
        self.database()
            .deliveries()
            .get_by_id(delivery_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Delivery", delivery_id))
    }

    async fn load_order(&self, order_id: &str) -> EngineResult<medirun_core::Order> {
        self.database()
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))
    }

    /// Moves the delivery row along with the (already applied) order
    /// transition. A miss means drift, which is logged, not fatal; the
    /// order row is the source of truth.
    async fn step_delivery(
        &self,
        delivery_id: &str,
        expected: DeliveryStatus,
        next: DeliveryStatus,
    ) -> EngineResult<()> {
        if !self
            .database()
            .deliveries()
            .update_status(delivery_id, expected, next)
            .await?
        {
            warn!(delivery_id = %delivery_id, "Delivery row drifted from order status");
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        customer, customer_owner, driver_actor, engine_with_catalog, engine_with_config, manager,
        place_ready_order, seed_driver, stock_of,
    };
    use crate::{EngineConfig, Role};

    #[tokio::test]
    async fn test_assign_requires_ready_order() {
        let engine = engine_with_catalog().await;
        seed_driver(&engine, "d-1", true).await;

        // A gated order cannot be assigned.
        let actor = customer();
        let owner = customer_owner();
        engine.cart_add(&actor, &owner, "med-b", 1).await.unwrap();
        let gated = engine
            .checkout(&actor, &owner, "12 High St", "09:00 - 12:00")
            .await
            .unwrap();

        let err = engine
            .assign_driver(&manager(), &gated.order_id, "d-1")
            .await
            .unwrap_err();
        match err {
            EngineError::InvalidTransition { from, to, .. } => {
                assert_eq!(from, OrderStatus::PendingPrescription);
                assert_eq!(to, OrderStatus::Assigned);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_assign_checks_driver() {
        let engine = engine_with_catalog().await;
        seed_driver(&engine, "d-busy", false).await;
        let order_id = place_ready_order(&engine, 1).await;

        // Unknown driver.
        assert!(matches!(
            engine
                .assign_driver(&manager(), &order_id, "ghost")
                .await
                .unwrap_err(),
            EngineError::NotFound { .. }
        ));

        // Unavailable driver.
        assert!(matches!(
            engine
                .assign_driver(&manager(), &order_id, "d-busy")
                .await
                .unwrap_err(),
            EngineError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_assign_respects_max_load() {
        let engine = engine_with_config(EngineConfig::default().max_driver_load(1)).await;
        seed_driver(&engine, "d-1", true).await;

        let first = place_ready_order(&engine, 1).await;
        let second = place_ready_order(&engine, 1).await;

        engine.assign_driver(&manager(), &first, "d-1").await.unwrap();
        assert_eq!(engine.driver_load(&manager(), "d-1").await.unwrap(), 1);

        let err = engine
            .assign_driver(&manager(), &second, "d-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_full_delivery_flow() {
        let engine = engine_with_catalog().await;
        seed_driver(&engine, "d-1", true).await;
        let order_id = place_ready_order(&engine, 2).await;

        let delivery_id = engine
            .assign_driver(&manager(), &order_id, "d-1")
            .await
            .unwrap();

        // Proof before departure is rejected: the order is only Assigned.
        let err = engine
            .mark_delivered(&driver_actor(), &delivery_id, "J. Doe", "files/pod-1.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        engine.start_delivery(&driver_actor(), &delivery_id).await.unwrap();
        engine
            .update_eta(&driver_actor(), &delivery_id, "15 min")
            .await
            .unwrap();
        engine
            .mark_delivered(&driver_actor(), &delivery_id, "J. Doe", "files/pod-1.jpg")
            .await
            .unwrap();

        let order = engine
            .database()
            .orders()
            .get_by_id(&order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);

        let delivery = engine
            .database()
            .deliveries()
            .get_by_id(&delivery_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.recipient_name.as_deref(), Some("J. Doe"));
        assert_eq!(delivery.eta.as_deref(), Some("15 min"));

        // Delivered consumes the stock: nothing is credited back, and the
        // completed driver no longer carries load.
        assert_eq!(stock_of(&engine, "med-a").await, 8);
        assert_eq!(engine.driver_load(&manager(), "d-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_report_issue_fails_order_and_restores_stock() {
        let engine = engine_with_catalog().await;
        seed_driver(&engine, "d-1", true).await;
        let order_id = place_ready_order(&engine, 3).await;
        assert_eq!(stock_of(&engine, "med-a").await, 7);

        let delivery_id = engine
            .assign_driver(&manager(), &order_id, "d-1")
            .await
            .unwrap();
        engine.start_delivery(&driver_actor(), &delivery_id).await.unwrap();

        engine
            .report_issue(
                &driver_actor(),
                &delivery_id,
                "address_not_found",
                "nobody home, phone off",
            )
            .await
            .unwrap();

        let order = engine
            .database()
            .orders()
            .get_by_id(&order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(stock_of(&engine, "med-a").await, 10);

        let delivery = engine
            .database()
            .deliveries()
            .get_by_id(&delivery_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Failed);
        assert!(delivery.notes.unwrap().starts_with("address_not_found:"));
    }

    #[tokio::test]
    async fn test_capacity_view_groups_and_caps() {
        let engine = engine_with_config(EngineConfig::default().max_orders_per_slot(2)).await;
        seed_driver(&engine, "d-1", true).await;
        seed_driver(&engine, "d-2", true).await;

        // Three orders in the same window: two for d-1, one for d-2.
        for driver in ["d-1", "d-1", "d-2"] {
            let order_id = place_ready_order(&engine, 1).await;
            engine.assign_driver(&manager(), &order_id, driver).await.unwrap();
        }

        let slots = engine.capacity_view(&manager()).await.unwrap();
        assert_eq!(slots.len(), 2);

        let d1 = slots.iter().find(|s| s.driver_id == "d-1").unwrap();
        assert_eq!(d1.window, "09:00 - 12:00");
        assert_eq!(d1.order_count, 2);
        assert_eq!(d1.capacity_percent, 100);

        let d2 = slots.iter().find(|s| s.driver_id == "d-2").unwrap();
        assert_eq!(d2.order_count, 1);
        assert_eq!(d2.capacity_percent, 50);

        // Over-capacity assignment is still permitted (advisory view): a
        // third order for d-1 stays at the 100 cap.
        let order_id = place_ready_order(&engine, 1).await;
        engine.assign_driver(&manager(), &order_id, "d-1").await.unwrap();

        let slots = engine.capacity_view(&manager()).await.unwrap();
        let d1 = slots.iter().find(|s| s.driver_id == "d-1").unwrap();
        assert_eq!(d1.order_count, 3);
        assert_eq!(d1.capacity_percent, 100);

        // Finance can read the view, drivers cannot.
        let finance = crate::Actor::new("f-1", Role::Finance);
        assert!(engine.capacity_view(&finance).await.is_ok());
        assert!(matches!(
            engine.capacity_view(&driver_actor()).await.unwrap_err(),
            EngineError::Forbidden { .. }
        ));
    }

    #[tokio::test]
    async fn test_capacity_slot_serializes_camel_case() {
        let slot = CapacitySlot {
            window: "09:00 - 12:00".to_string(),
            driver_id: "d-1".to_string(),
            driver_name: "Dana".to_string(),
            order_count: 2,
            capacity_percent: 40,
        };

        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["driverName"], "Dana");
        assert_eq!(json["capacityPercent"], 40);
    }

    #[tokio::test]
    async fn test_driver_toggles_availability() {
        let engine = engine_with_catalog().await;
        seed_driver(&engine, "d-1", true).await;

        engine
            .set_driver_availability(&driver_actor(), "d-1", false)
            .await
            .unwrap();
        assert!(engine.available_drivers(&manager()).await.unwrap().is_empty());
    }
}
