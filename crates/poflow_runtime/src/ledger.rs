use chrono::{NaiveDate, Utc};
use poflow_model::{AuditAction, DeliveryRecord, Order, OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::diff_entries;
use crate::context::RuntimeContext;
use crate::errors::RuntimeError;
use crate::store::{OrderStore, StoreError};
use crate::workflow::{WorkflowEngine, settle};

const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub order: Order,
    pub record: DeliveryRecord,
    /// The delivery brought pending to zero and closed the order.
    pub completed: bool,
    /// Side records (history row, audit) that could not be written after
    /// the order itself was updated.
    pub warnings: Vec<String>,
}

/// Flat `(success, message)` answer for callers that only report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub message: String,
}

impl From<&Result<DeliveryReceipt, RuntimeError>> for DeliveryOutcome {
    fn from(result: &Result<DeliveryReceipt, RuntimeError>) -> Self {
        match result {
            Ok(receipt) if receipt.completed => DeliveryOutcome {
                success: true,
                message: format!(
                    "delivery of {} registered; order delivered in full",
                    receipt.record.quantity.normalize()
                ),
            },
            Ok(receipt) => DeliveryOutcome {
                success: true,
                message: format!(
                    "delivery of {} registered; {} still pending",
                    receipt.record.quantity.normalize(),
                    receipt.order.quantity_pending().normalize()
                ),
            },
            Err(e) => DeliveryOutcome {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Registers partial deliveries against one order at a time.
pub struct DeliveryLedger {
    store: Arc<dyn OrderStore>,
    workflow: WorkflowEngine,
}

impl DeliveryLedger {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            workflow: WorkflowEngine::new(),
        }
    }

    pub async fn register_delivery(
        &self,
        ctx: &RuntimeContext,
        order_id: &OrderId,
        quantity: Decimal,
        delivery_date: NaiveDate,
        note: Option<&str>,
    ) -> Result<DeliveryReceipt, RuntimeError> {
        if quantity <= Decimal::ZERO {
            return Err(RuntimeError::ValidationError(format!(
                "quantity must be greater than 0 (got {})",
                quantity.normalize()
            )));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = self
                .store
                .get_order(&ctx.tenant_id, order_id)
                .await?
                .ok_or_else(|| RuntimeError::OrderNotFound(order_id.clone()))?;

            let pending = order.quantity_pending();
            if quantity > pending {
                return Err(RuntimeError::ValidationError(format!(
                    "quantity {} exceeds pending quantity {}",
                    quantity.normalize(),
                    pending.normalize()
                )));
            }

            let mut after = order.fields.clone();
            after.quantity_delivered += quantity;
            let completed = settle(&mut after, delivery_date);
            self.workflow.validate(Some(&order.fields), &after)?;

            let updated = match self
                .store
                .update_order(&ctx.tenant_id, order_id, order.version, after)
                .await
            {
                Ok(updated) => updated,
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    warn!(order = %order_id, attempt, "order changed while registering delivery, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            // The order update is committed; from here on failures are warnings.
            let mut warnings = Vec::new();
            let record = DeliveryRecord {
                id: Uuid::new_v4(),
                order_id: order_id.clone(),
                tenant_id: ctx.tenant_id.clone(),
                quantity,
                delivery_date,
                note: note.map(str::to_string),
                delivered_after: updated.fields.quantity_delivered,
                actor_id: ctx.actor_id.clone(),
                recorded_at: Utc::now(),
            };
            if let Err(e) = self.store.append_delivery(&record).await {
                warn!(order = %order_id, error = %e, "delivery history row not recorded");
                warnings.push(format!("delivery history not recorded: {}", e));
            }

            let entries = diff_entries(ctx, order_id, &order.fields, &updated.fields, AuditAction::Delivery, note);
            if let Err(e) = self.store.append_audit(&entries).await {
                warn!(order = %order_id, error = %e, "delivery audit not recorded");
                warnings.push(format!("audit not recorded: {}", e));
            }

            info!(
                tenant = %ctx.tenant_id,
                order = %order_id,
                quantity = %quantity.normalize(),
                pending = %updated.quantity_pending().normalize(),
                completed,
                "delivery registered"
            );

            return Ok(DeliveryReceipt {
                order: updated,
                record,
                completed,
                warnings,
            });
        }
    }

    pub async fn history(&self, ctx: &RuntimeContext, order_id: &OrderId) -> Result<Vec<DeliveryRecord>, RuntimeError> {
        Ok(self.store.delivery_history(&ctx.tenant_id, order_id).await?)
    }
}
