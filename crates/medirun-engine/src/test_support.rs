//! Shared fixtures for engine tests: an in-memory database with a small
//! seeded catalog, plus the usual actors.
//!
//! Catalog: `med-a` (stock 10, 349 cents, no prescription) and `med-b`
//! (stock 5, 1200 cents, prescription-only): the quantities the lifecycle
//! scenarios are written against.

use chrono::Utc;

use crate::{Actor, Engine, EngineConfig, Role};
use medirun_core::{Driver, Medicine, Owner};
use medirun_db::{Database, DbConfig};

pub(crate) async fn engine_with_config(config: EngineConfig) -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = Engine::new(db, config);
    seed_medicine(&engine, "med-a", 10, 349, false).await;
    seed_medicine(&engine, "med-b", 5, 1200, true).await;
    engine
}

pub(crate) async fn engine_with_catalog() -> Engine {
    engine_with_config(EngineConfig::default()).await
}

pub(crate) async fn seed_medicine(
    engine: &Engine,
    id: &str,
    stock: i64,
    unit_price_cents: i64,
    requires_prescription: bool,
) {
    let now = Utc::now();
    engine
        .database()
        .medicines()
        .insert(&Medicine {
            id: id.to_string(),
            name: format!("Medicine {}", id),
            category: None,
            unit_price_cents,
            stock_on_hand: stock,
            requires_prescription,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

pub(crate) async fn seed_driver(engine: &Engine, id: &str, available: bool) {
    engine
        .database()
        .drivers()
        .insert(&Driver {
            id: id.to_string(),
            name: format!("Driver {}", id),
            service_area: Some("North".to_string()),
            available,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

pub(crate) async fn stock_of(engine: &Engine, medicine_id: &str) -> i64 {
    engine
        .database()
        .medicines()
        .get_by_id(medicine_id)
        .await
        .unwrap()
        .unwrap()
        .stock_on_hand
}

pub(crate) fn customer() -> Actor {
    Actor::new("42", Role::Customer)
}

pub(crate) fn pharmacist() -> Actor {
    Actor::new("ph-1", Role::Pharmacist)
}

pub(crate) fn manager() -> Actor {
    Actor::new("mg-1", Role::Manager)
}

pub(crate) fn driver_actor() -> Actor {
    Actor::new("d-1", Role::Driver)
}

pub(crate) fn customer_owner() -> Owner {
    Owner::Customer("42".to_string())
}

pub(crate) fn guest_owner(token: &str) -> Owner {
    Owner::Guest(token.to_string())
}

/// Checkout of `qty` units of med-a for the standard customer; the order
/// starts `Ready`.
pub(crate) async fn place_ready_order(engine: &Engine, qty: i64) -> String {
    let actor = customer();
    let owner = customer_owner();
    engine.cart_add(&actor, &owner, "med-a", qty).await.unwrap();
    engine
        .checkout(&actor, &owner, "12 High St", "09:00 - 12:00")
        .await
        .unwrap()
        .order_id
}
