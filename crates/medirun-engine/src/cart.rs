//! # Cart Store
//!
//! One cart contract, two storage backends.
//!
//! ## Backend Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CartStore Routing                                │
//! │                                                                         │
//! │  Owner::Guest(token) ─────► GuestCarts                                 │
//! │                             in-process map, mutex-guarded,             │
//! │                             gone when the process restarts             │
//! │                                                                         │
//! │  Owner::Customer(id) ─────► SqliteCarts                                │
//! │                             durable rows, merge-on-add upsert          │
//! │                                                                         │
//! │  Login: merge_guest_into_customer(token, id)                           │
//! │         moves every guest line into the durable cart, summing          │
//! │         quantities with whatever is already there (no loss,            │
//! │         no duplication).                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both backends enforce the same rules the pure [`Cart`] type encodes:
//! merge-on-add, positive quantities, bounded line count. Stock is NOT
//! checked here: it may change between cart edit and checkout, so only
//! the checkout reservation decides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::authz::{authorize, Actor, Capability};
use crate::error::{EngineError, EngineResult};
use medirun_core::{Cart, CartLine, CoreError, Owner, MAX_CART_LINES, MAX_LINE_QUANTITY};
use medirun_core::validation::validate_quantity;
use medirun_db::CartRepository;

use crate::Engine;

// =============================================================================
// Backend Contract
// =============================================================================

/// The storage contract both cart backends implement. Keys are the
/// persisted owner form (`customer:<id>` / `guest:<token>`).
#[async_trait]
pub trait CartBackend: Send + Sync {
    async fn add(&self, key: &str, medicine_id: &str, quantity: i64) -> EngineResult<()>;
    async fn update_quantity(&self, key: &str, medicine_id: &str, quantity: i64)
        -> EngineResult<()>;
    async fn remove(&self, key: &str, medicine_id: &str) -> EngineResult<()>;
    async fn lines(&self, key: &str) -> EngineResult<Vec<CartLine>>;
    async fn clear(&self, key: &str) -> EngineResult<()>;
}

// =============================================================================
// Guest Backend (ephemeral)
// =============================================================================

/// In-process cart storage for guest sessions.
///
/// `Arc<Mutex<..>>` because engine handles are cloned across request tasks
/// and two tabs of the same guest session may race; the mutex plus the pure
/// `Cart` merge rule keep concurrent adds to the same medicine summed, not
/// lost.
#[derive(Debug, Clone, Default)]
pub struct GuestCarts {
    carts: Arc<Mutex<HashMap<String, Cart>>>,
}

impl GuestCarts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes the guest cart entirely and returns its lines (login merge).
    fn take(&self, key: &str) -> Vec<CartLine> {
        let mut carts = self.carts.lock().expect("guest cart mutex poisoned");
        carts.remove(key).map(|mut c| c.drain()).unwrap_or_default()
    }

    /// Puts lines back after a failed merge so nothing is lost.
    fn restore(&self, key: &str, lines: Vec<CartLine>) {
        let mut carts = self.carts.lock().expect("guest cart mutex poisoned");
        let cart = carts.entry(key.to_string()).or_default();
        for line in lines {
            // Quantities were valid when taken; ignore the re-add result.
            let _ = cart.add_line(&line.medicine_id, line.quantity);
        }
    }
}

#[async_trait]
impl CartBackend for GuestCarts {
    async fn add(&self, key: &str, medicine_id: &str, quantity: i64) -> EngineResult<()> {
        let mut carts = self.carts.lock().expect("guest cart mutex poisoned");
        let cart = carts.entry(key.to_string()).or_default();
        cart.add_line(medicine_id, quantity)?;
        Ok(())
    }

    async fn update_quantity(
        &self,
        key: &str,
        medicine_id: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        let mut carts = self.carts.lock().expect("guest cart mutex poisoned");
        let cart = carts
            .get_mut(key)
            .ok_or_else(|| EngineError::not_found("Cart line", medicine_id))?;
        cart.update_quantity(medicine_id, quantity)?;
        Ok(())
    }

    async fn remove(&self, key: &str, medicine_id: &str) -> EngineResult<()> {
        let mut carts = self.carts.lock().expect("guest cart mutex poisoned");
        let cart = carts
            .get_mut(key)
            .ok_or_else(|| EngineError::not_found("Cart line", medicine_id))?;
        cart.remove_line(medicine_id)?;
        Ok(())
    }

    async fn lines(&self, key: &str) -> EngineResult<Vec<CartLine>> {
        let carts = self.carts.lock().expect("guest cart mutex poisoned");
        Ok(carts.get(key).map(|c| c.lines().to_vec()).unwrap_or_default())
    }

    async fn clear(&self, key: &str) -> EngineResult<()> {
        let mut carts = self.carts.lock().expect("guest cart mutex poisoned");
        carts.remove(key);
        Ok(())
    }
}

// =============================================================================
// Durable Backend (customers)
// =============================================================================

/// Durable cart storage over the carts table.
///
/// The merge-on-add itself is a single upsert (race-safe); the line-count
/// and quantity caps are pre-checked here, mirroring what the pure `Cart`
/// enforces for guests.
#[derive(Debug, Clone)]
pub struct SqliteCarts {
    repo: CartRepository,
}

impl SqliteCarts {
    pub fn new(repo: CartRepository) -> Self {
        SqliteCarts { repo }
    }
}

#[async_trait]
impl CartBackend for SqliteCarts {
    async fn add(&self, key: &str, medicine_id: &str, quantity: i64) -> EngineResult<()> {
        let existing = self
            .repo
            .lines(key)
            .await?
            .into_iter()
            .find(|l| l.medicine_id == medicine_id);

        match existing {
            Some(line) => {
                if line.quantity + quantity > MAX_LINE_QUANTITY {
                    return Err(CoreError::QuantityTooLarge {
                        requested: line.quantity + quantity,
                        max: MAX_LINE_QUANTITY,
                    }
                    .into());
                }
            }
            None => {
                if self.repo.count_lines(key).await? >= MAX_CART_LINES as i64 {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_LINES,
                    }
                    .into());
                }
            }
        }

        self.repo.add(key, medicine_id, quantity).await?;
        Ok(())
    }

    async fn update_quantity(
        &self,
        key: &str,
        medicine_id: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        if !self.repo.update_quantity(key, medicine_id, quantity).await? {
            return Err(EngineError::not_found("Cart line", medicine_id));
        }
        Ok(())
    }

    async fn remove(&self, key: &str, medicine_id: &str) -> EngineResult<()> {
        if !self.repo.remove(key, medicine_id).await? {
            return Err(EngineError::not_found("Cart line", medicine_id));
        }
        Ok(())
    }

    async fn lines(&self, key: &str) -> EngineResult<Vec<CartLine>> {
        Ok(self.repo.lines(key).await?)
    }

    async fn clear(&self, key: &str) -> EngineResult<()> {
        self.repo.clear(key).await?;
        Ok(())
    }
}

// =============================================================================
// Cart Store (router)
// =============================================================================

/// Routes cart operations to the backend matching the owner kind.
#[derive(Debug, Clone)]
pub struct CartStore {
    guest: GuestCarts,
    durable: SqliteCarts,
}

impl CartStore {
    pub fn new(repo: CartRepository) -> Self {
        CartStore {
            guest: GuestCarts::new(),
            durable: SqliteCarts::new(repo),
        }
    }

    fn backend(&self, owner: &Owner) -> &dyn CartBackend {
        if owner.is_customer() {
            &self.durable
        } else {
            &self.guest
        }
    }

    pub async fn add(&self, owner: &Owner, medicine_id: &str, quantity: i64) -> EngineResult<()> {
        self.backend(owner)
            .add(&owner.to_string(), medicine_id, quantity)
            .await
    }

    pub async fn update_quantity(
        &self,
        owner: &Owner,
        medicine_id: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        self.backend(owner)
            .update_quantity(&owner.to_string(), medicine_id, quantity)
            .await
    }

    pub async fn remove(&self, owner: &Owner, medicine_id: &str) -> EngineResult<()> {
        self.backend(owner)
            .remove(&owner.to_string(), medicine_id)
            .await
    }

    pub async fn lines(&self, owner: &Owner) -> EngineResult<Vec<CartLine>> {
        self.backend(owner).lines(&owner.to_string()).await
    }

    pub async fn clear(&self, owner: &Owner) -> EngineResult<()> {
        self.backend(owner).clear(&owner.to_string()).await
    }

    /// Moves a guest cart into a customer's durable cart at login.
    ///
    /// Quantities merge with whatever the durable cart already holds. If a
    /// durable write fails mid-way, the unmoved lines are put back into the
    /// guest cart so nothing is silently dropped.
    pub async fn merge_guest_into_customer(
        &self,
        guest_token: &str,
        customer_id: &str,
    ) -> EngineResult<usize> {
        let guest_key = Owner::Guest(guest_token.to_string()).to_string();
        let customer_key = Owner::Customer(customer_id.to_string()).to_string();

        let lines = self.guest.take(&guest_key);
        let moved = lines.len();

        for (idx, line) in lines.iter().enumerate() {
            if let Err(err) = self
                .durable
                .add(&customer_key, &line.medicine_id, line.quantity)
                .await
            {
                self.guest.restore(&guest_key, lines[idx..].to_vec());
                return Err(err);
            }
        }

        info!(guest = %guest_key, customer = %customer_key, moved, "Guest cart merged");
        Ok(moved)
    }
}

// =============================================================================
// Engine Surface
// =============================================================================

impl Engine {
    /// Adds a medicine to the owner's cart (merge-on-add).
    pub async fn cart_add(
        &self,
        actor: &Actor,
        owner: &Owner,
        medicine_id: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        authorize(actor, Capability::ManageCart)?;
        validate_quantity(quantity).map_err(EngineError::Validation)?;

        // The medicine must exist and be orderable; its stock is NOT
        // checked here (checkout reserves).
        let medicine = self
            .database()
            .medicines()
            .get_by_id(medicine_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| EngineError::not_found("Medicine", medicine_id))?;

        debug!(owner = %owner, medicine = %medicine.name, quantity, "Cart add");
        self.carts().add(owner, medicine_id, quantity).await
    }

    /// Replaces the quantity of a cart line. Rejects `quantity <= 0`.
    pub async fn cart_update_quantity(
        &self,
        actor: &Actor,
        owner: &Owner,
        medicine_id: &str,
        quantity: i64,
    ) -> EngineResult<()> {
        authorize(actor, Capability::ManageCart)?;
        validate_quantity(quantity).map_err(EngineError::Validation)?;

        self.carts()
            .update_quantity(owner, medicine_id, quantity)
            .await
    }

    /// Removes a cart line.
    pub async fn cart_remove(
        &self,
        actor: &Actor,
        owner: &Owner,
        medicine_id: &str,
    ) -> EngineResult<()> {
        authorize(actor, Capability::ManageCart)?;
        self.carts().remove(owner, medicine_id).await
    }

    /// Returns the owner's current cart lines.
    pub async fn cart_lines(&self, actor: &Actor, owner: &Owner) -> EngineResult<Vec<CartLine>> {
        authorize(actor, Capability::ManageCart)?;
        self.carts().lines(owner).await
    }

    /// Login hook: folds a guest session's cart into the customer's cart.
    pub async fn merge_guest_cart(
        &self,
        actor: &Actor,
        guest_token: &str,
        customer_id: &str,
    ) -> EngineResult<usize> {
        authorize(actor, Capability::ManageCart)?;
        self.carts()
            .merge_guest_into_customer(guest_token, customer_id)
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, customer_owner, engine_with_catalog, guest_owner};

    #[tokio::test]
    async fn test_guest_cart_merge_on_add() {
        let engine = engine_with_catalog().await;
        let actor = Actor::new("sess-1", crate::Role::Customer);
        let owner = guest_owner("sess-1");

        engine.cart_add(&actor, &owner, "med-a", 2).await.unwrap();
        engine.cart_add(&actor, &owner, "med-a", 3).await.unwrap();

        let lines = engine.cart_lines(&actor, &owner).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_customer_cart_merge_on_add() {
        let engine = engine_with_catalog().await;
        let actor = customer();
        let owner = customer_owner();

        engine.cart_add(&actor, &owner, "med-a", 2).await.unwrap();
        engine.cart_add(&actor, &owner, "med-a", 1).await.unwrap();

        let lines = engine.cart_lines(&actor, &owner).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_cart_rejects_bad_input() {
        let engine = engine_with_catalog().await;
        let actor = customer();
        let owner = customer_owner();

        // Non-positive quantities never reach the store.
        assert!(matches!(
            engine.cart_add(&actor, &owner, "med-a", 0).await.unwrap_err(),
            EngineError::Validation(_)
        ));

        // Unknown medicine.
        assert!(matches!(
            engine.cart_add(&actor, &owner, "ghost", 1).await.unwrap_err(),
            EngineError::NotFound { .. }
        ));

        // Updating a line that does not exist.
        assert!(matches!(
            engine
                .cart_update_quantity(&actor, &owner, "med-a", 2)
                .await
                .unwrap_err(),
            EngineError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_cart_update_and_remove() {
        let engine = engine_with_catalog().await;
        let actor = customer();
        let owner = customer_owner();

        engine.cart_add(&actor, &owner, "med-a", 2).await.unwrap();
        engine
            .cart_update_quantity(&actor, &owner, "med-a", 7)
            .await
            .unwrap();
        assert_eq!(
            engine.cart_lines(&actor, &owner).await.unwrap()[0].quantity,
            7
        );

        assert!(matches!(
            engine
                .cart_update_quantity(&actor, &owner, "med-a", -1)
                .await
                .unwrap_err(),
            EngineError::Validation(_)
        ));

        engine.cart_remove(&actor, &owner, "med-a").await.unwrap();
        assert!(engine.cart_lines(&actor, &owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guest_to_customer_merge() {
        let engine = engine_with_catalog().await;
        let guest_actor = Actor::new("sess-9", crate::Role::Customer);
        let guest = guest_owner("sess-9");
        let cust_actor = customer();
        let cust = customer_owner();

        // Guest collected two medicines; the customer cart already holds
        // one of them.
        engine.cart_add(&guest_actor, &guest, "med-a", 2).await.unwrap();
        engine.cart_add(&guest_actor, &guest, "med-b", 1).await.unwrap();
        engine.cart_add(&cust_actor, &cust, "med-a", 1).await.unwrap();

        let moved = engine
            .merge_guest_cart(&cust_actor, "sess-9", "42")
            .await
            .unwrap();
        assert_eq!(moved, 2);

        // Merged without loss or duplication.
        let lines = engine.cart_lines(&cust_actor, &cust).await.unwrap();
        assert_eq!(lines.len(), 2);
        let med_a = lines.iter().find(|l| l.medicine_id == "med-a").unwrap();
        assert_eq!(med_a.quantity, 3);

        // Guest cart is gone.
        assert!(engine
            .cart_lines(&guest_actor, &guest)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cart_requires_capability() {
        let engine = engine_with_catalog().await;
        let driver = Actor::new("d-1", crate::Role::Driver);
        let owner = customer_owner();

        assert!(matches!(
            engine.cart_add(&driver, &owner, "med-a", 1).await.unwrap_err(),
            EngineError::Forbidden { .. }
        ));
    }
}
