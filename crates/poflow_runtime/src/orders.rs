use chrono::{NaiveDate, Utc};
use poflow_model::{AuditAction, AuditEntry, DeliveryRecord, Order, OrderFields, OrderId, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::audit::{create_entry, diff_entries};
use crate::context::RuntimeContext;
use crate::directory::resolve_department;
use crate::errors::RuntimeError;
use crate::store::{OrderStore, StoreError};
use crate::workflow::{WorkflowEngine, align_status_with_po, settle};

/// Partial update of an order typed in by an operator. `None` leaves the
/// field alone; an empty string clears an optional text field. Delivered
/// quantity is not editable here, deliveries go through the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderEdit {
    pub requisition_number: Option<String>,
    pub purchase_order_number: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    pub equipment_code: Option<String>,
    pub material_code: Option<String>,
    pub supplier_id: Option<String>,
    pub quantity_requested: Option<Decimal>,
    pub status: Option<OrderStatus>,
    pub requested_date: Option<NaiveDate>,
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub unit_price: Option<Decimal>,
    pub last_purchase_price: Option<Decimal>,
    pub value_total: Option<Decimal>,
    /// Optimistic lock; the stored version is used when absent.
    pub expected_version: Option<i64>,
    pub reason: Option<String>,
}

fn set_text(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        let v = v.trim();
        *target = if v.is_empty() { None } else { Some(v.to_string()) };
    }
}

impl OrderEdit {
    fn apply(&self, fields: &mut OrderFields) {
        set_text(&mut fields.requisition_number, &self.requisition_number);
        set_text(&mut fields.purchase_order_number, &self.purchase_order_number);
        if let Some(description) = &self.description {
            fields.description = description.trim().to_string();
        }
        set_text(&mut fields.department, &self.department);
        set_text(&mut fields.equipment_code, &self.equipment_code);
        set_text(&mut fields.material_code, &self.material_code);
        set_text(&mut fields.supplier_id, &self.supplier_id);
        if let Some(q) = self.quantity_requested {
            fields.quantity_requested = q;
        }
        if let Some(status) = self.status {
            fields.status = status;
        }
        if self.requested_date.is_some() {
            fields.requested_date = self.requested_date;
        }
        if self.po_date.is_some() {
            fields.po_date = self.po_date;
        }
        if self.expected_delivery_date.is_some() {
            fields.expected_delivery_date = self.expected_delivery_date;
        }
        if self.unit_price.is_some() {
            fields.unit_price = self.unit_price;
        }
        if self.last_purchase_price.is_some() {
            fields.last_purchase_price = self.last_purchase_price;
        }
        if let Some(total) = self.value_total {
            fields.value_total = total;
        }
    }
}

/// Manual order entry and edits, plus the per-order read models.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    workflow: WorkflowEngine,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            workflow: WorkflowEngine::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub async fn create_order(
        &self,
        ctx: &RuntimeContext,
        mut fields: OrderFields,
        reason: Option<&str>,
    ) -> Result<Order, RuntimeError> {
        if fields.description.trim().is_empty() {
            return Err(RuntimeError::ValidationError("description is required".to_string()));
        }
        if fields.quantity_requested <= Decimal::ZERO {
            return Err(RuntimeError::ValidationError(
                "quantity_requested must be greater than 0".to_string(),
            ));
        }

        align_status_with_po(&mut fields);
        settle(&mut fields, Utc::now().date_naive());
        self.workflow.validate(None, &fields)?;

        if fields.department_id.is_none()
            && let Some(name) = fields.department.clone()
            && let Some(department) = resolve_department(self.store.as_ref(), &ctx.tenant_id, &name).await
        {
            fields.department = Some(department.name);
            fields.department_id = Some(department.id);
        }

        let order = self.store.insert_order(&ctx.tenant_id, fields).await?;
        self.record_audit(&[create_entry(ctx, &order.id, reason)]).await;

        info!(tenant = %ctx.tenant_id, order = %order.id, key = ?order.fields.business_key(), "order created");
        Ok(order)
    }

    pub async fn edit_order(&self, ctx: &RuntimeContext, id: &OrderId, edit: &OrderEdit) -> Result<Order, RuntimeError> {
        let order = self
            .store
            .get_order(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| RuntimeError::OrderNotFound(id.clone()))?;

        if let Some(expected) = edit.expected_version
            && expected != order.version
        {
            return Err(StoreError::VersionConflict {
                id: id.clone(),
                expected,
                found: order.version,
            }
            .into());
        }

        if let Some(q) = edit.quantity_requested
            && q <= Decimal::ZERO
        {
            return Err(RuntimeError::ValidationError(
                "quantity_requested must be greater than 0".to_string(),
            ));
        }

        let mut after = order.fields.clone();
        edit.apply(&mut after);
        if after.description.is_empty() {
            return Err(RuntimeError::ValidationError("description is required".to_string()));
        }

        if after.department != order.fields.department {
            after.department_id = None;
            if let Some(name) = after.department.clone()
                && let Some(department) = resolve_department(self.store.as_ref(), &ctx.tenant_id, &name).await
            {
                after.department = Some(department.name);
                after.department_id = Some(department.id);
            }
        }

        align_status_with_po(&mut after);
        settle(&mut after, Utc::now().date_naive());
        self.workflow.validate(Some(&order.fields), &after)?;

        if order.fields.changed_fields(&after).is_empty() {
            debug!(order = %id, "edit changes nothing");
            return Ok(order);
        }

        let updated = self
            .store
            .update_order(&ctx.tenant_id, id, order.version, after)
            .await?;
        let entries = diff_entries(
            ctx,
            id,
            &order.fields,
            &updated.fields,
            AuditAction::Edit,
            edit.reason.as_deref(),
        );
        self.record_audit(&entries).await;

        info!(tenant = %ctx.tenant_id, order = %id, fields = entries.len(), "order edited");
        Ok(updated)
    }

    /// Runs after the order write has committed, so a failure is only logged.
    async fn record_audit(&self, entries: &[AuditEntry]) {
        if let Err(e) = self.store.append_audit(entries).await {
            error!(error = %e, entries = entries.len(), "failed to write audit entries");
        }
    }

    pub async fn get_order(&self, ctx: &RuntimeContext, id: &OrderId) -> Result<Order, RuntimeError> {
        self.store
            .get_order(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| RuntimeError::OrderNotFound(id.clone()))
    }

    pub async fn list_orders(&self, ctx: &RuntimeContext) -> Result<Vec<Order>, RuntimeError> {
        Ok(self.store.list_orders(&ctx.tenant_id).await?)
    }

    pub async fn audit_trail(&self, ctx: &RuntimeContext, id: &OrderId) -> Result<Vec<AuditEntry>, RuntimeError> {
        self.get_order(ctx, id).await?;
        Ok(self.store.audit_trail(&ctx.tenant_id, id).await?)
    }

    pub async fn delivery_history(&self, ctx: &RuntimeContext, id: &OrderId) -> Result<Vec<DeliveryRecord>, RuntimeError> {
        self.get_order(ctx, id).await?;
        Ok(self.store.delivery_history(&ctx.tenant_id, id).await?)
    }
}
