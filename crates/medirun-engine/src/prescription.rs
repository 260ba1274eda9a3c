//! # Prescription Gate
//!
//! The approval step that blocks prescription-only order lines from
//! proceeding to delivery until a pharmacist approves the uploaded document.
//!
//! ## Review Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  upload ──► Pending ──approve──► Approved                              │
//! │               ▲  │                   │                                  │
//! │               │  └─reject──► Rejected│ (reason mandatory)              │
//! │               │                  │   │                                  │
//! │               └────re-upload─────┘   │                                  │
//! │                                      ▼                                  │
//! │     linked order: PendingPrescription ──► Ready (no re-reserve)        │
//! │     no linked order yet: a placeholder Ready order is created          │
//! │                          and linked (upload preceded checkout)         │
//! │                                                                         │
//! │  Rejection does NOT cancel the order; the customer may re-upload,      │
//! │  which resets the prescription to Pending on the SAME order.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::authz::{authorize, Actor, Capability, Role};
use crate::error::{EngineError, EngineResult};
use crate::workflow::ensure_owner;
use crate::Engine;
use medirun_core::validation::{require_text, validate_uuid};
use medirun_core::{
    Order, OrderStatus, Owner, Prescription, PrescriptionStatus, ValidationError,
};

/// Address used for placeholder orders until the customer confirms one.
const PLACEHOLDER_ADDRESS: &str = "To be confirmed";

// =============================================================================
// Result DTO
// =============================================================================

/// Outcome of an approval: which order is now ready, and whether it had to
/// be created by the approval itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub order_id: String,
    pub order_created: bool,
}

// =============================================================================
// Prescription Gate
// =============================================================================

impl Engine {
    /// Records an uploaded prescription document, optionally linked to an
    /// order that is waiting on it.
    ///
    /// ## Returns
    /// The new prescription id.
    pub async fn upload_prescription(
        &self,
        actor: &Actor,
        owner: &Owner,
        file_ref: &str,
        order_id: Option<&str>,
    ) -> EngineResult<String> {
        authorize(actor, Capability::UploadPrescription)?;
        let file_ref = require_text("file reference", file_ref).map_err(EngineError::Validation)?;

        if let Some(order_id) = order_id {
            validate_uuid("order id", order_id).map_err(EngineError::Validation)?;
            self.database()
                .orders()
                .get_by_id(order_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        }

        let now = Utc::now();
        let prescription = Prescription {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.map(|s| s.to_string()),
            owner_ref: owner.to_string(),
            file_ref,
            status: PrescriptionStatus::Pending,
            rejection_reason: None,
            uploaded_at: now,
            updated_at: now,
        };

        self.database().prescriptions().insert(&prescription).await?;

        info!(prescription_id = %prescription.id, owner = %owner, "Prescription uploaded");
        Ok(prescription.id)
    }

    /// Pharmacist approval.
    ///
    /// Moves the linked order `PendingPrescription → Ready` (stock stays
    /// reserved from checkout, nothing is re-reserved). When the upload
    /// preceded checkout and no order is linked yet, a placeholder `Ready`
    /// order is created and linked instead.
    pub async fn approve_prescription(
        &self,
        actor: &Actor,
        prescription_id: &str,
    ) -> EngineResult<ApprovalOutcome> {
        authorize(actor, Capability::ReviewPrescription)?;
        validate_uuid("prescription id", prescription_id).map_err(EngineError::Validation)?;

        let prescription = self
            .database()
            .prescriptions()
            .get_by_id(prescription_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Prescription", prescription_id))?;

        let applied = self
            .database()
            .prescriptions()
            .update_status(
                prescription_id,
                PrescriptionStatus::Pending,
                PrescriptionStatus::Approved,
                None,
            )
            .await?;

        if !applied {
            return Err(EngineError::Validation(ValidationError::NotAllowed {
                field: "prescription status".to_string(),
                allowed: vec!["pending".to_string()],
            }));
        }

        let outcome = match &prescription.order_id {
            Some(order_id) => {
                let order = self
                    .database()
                    .orders()
                    .get_by_id(order_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("Order", order_id))?;
                self.apply_transition(&order, OrderStatus::Ready).await?;

                ApprovalOutcome {
                    order_id: order_id.clone(),
                    order_created: false,
                }
            }
            None => {
                let order_id = self.create_placeholder_order(&prescription).await?;
                self.database()
                    .prescriptions()
                    .link_order(prescription_id, &order_id)
                    .await?;

                ApprovalOutcome {
                    order_id,
                    order_created: true,
                }
            }
        };

        info!(
            prescription_id = %prescription_id,
            order_id = %outcome.order_id,
            order_created = outcome.order_created,
            "Prescription approved"
        );
        Ok(outcome)
    }

    /// Pharmacist rejection with a mandatory reason.
    ///
    /// Deliberately does NOT cancel the linked order: the customer may
    /// re-upload a corrected document against the same order.
    pub async fn reject_prescription(
        &self,
        actor: &Actor,
        prescription_id: &str,
        reason: &str,
    ) -> EngineResult<()> {
        authorize(actor, Capability::ReviewPrescription)?;
        validate_uuid("prescription id", prescription_id).map_err(EngineError::Validation)?;
        let reason = require_text("rejection reason", reason).map_err(EngineError::Validation)?;

        self.database()
            .prescriptions()
            .get_by_id(prescription_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Prescription", prescription_id))?;

        let applied = self
            .database()
            .prescriptions()
            .update_status(
                prescription_id,
                PrescriptionStatus::Pending,
                PrescriptionStatus::Rejected,
                Some(&reason),
            )
            .await?;

        if !applied {
            return Err(EngineError::Validation(ValidationError::NotAllowed {
                field: "prescription status".to_string(),
                allowed: vec!["pending".to_string()],
            }));
        }

        info!(prescription_id = %prescription_id, reason = %reason, "Prescription rejected");
        Ok(())
    }

    /// Customer re-upload after a rejection: replaces the document and
    /// resets the prescription to pending review on the same order.
    pub async fn reupload_prescription(
        &self,
        actor: &Actor,
        prescription_id: &str,
        file_ref: &str,
    ) -> EngineResult<()> {
        authorize(actor, Capability::UploadPrescription)?;
        validate_uuid("prescription id", prescription_id).map_err(EngineError::Validation)?;
        let file_ref = require_text("file reference", file_ref).map_err(EngineError::Validation)?;

        let prescription = self
            .database()
            .prescriptions()
            .get_by_id(prescription_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Prescription", prescription_id))?;

        if actor.role == Role::Customer {
            ensure_owner(actor, &prescription.owner_ref)?;
        }

        let applied = self
            .database()
            .prescriptions()
            .reupload(prescription_id, &file_ref)
            .await?;

        if !applied {
            return Err(EngineError::Validation(ValidationError::NotAllowed {
                field: "prescription status".to_string(),
                allowed: vec!["rejected".to_string()],
            }));
        }

        info!(prescription_id = %prescription_id, "Prescription re-uploaded, pending review again");
        Ok(())
    }

    /// The pharmacist's review queue, oldest first.
    pub async fn pending_prescriptions(&self, actor: &Actor) -> EngineResult<Vec<Prescription>> {
        authorize(actor, Capability::ReviewPrescription)?;
        Ok(self.database().prescriptions().list_pending().await?)
    }

    /// Placeholder order for the upload-before-checkout flow. Starts Ready
    /// (the prescription is already approved) with nothing reserved; the
    /// customer confirms address and lines later.
    async fn create_placeholder_order(&self, prescription: &Prescription) -> EngineResult<String> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: crate::checkout::generate_order_number(),
            owner_ref: prescription.owner_ref.clone(),
            status: OrderStatus::Ready,
            delivery_address: PLACEHOLDER_ADDRESS.to_string(),
            delivery_window: self.config().default_delivery_window.clone(),
            weight_grams: 0,
            total_cents: 0,
            reservation_token: None,
            created_at: now,
            updated_at: now,
        };

        self.database().orders().insert_with_lines(&order, &[]).await?;
        Ok(order.id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
