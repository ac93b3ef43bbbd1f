use chrono::Utc;
use poflow_model::{AuditAction, AuditEntry, OrderFields, OrderId};
use uuid::Uuid;

use crate::context::RuntimeContext;

pub fn create_entry(ctx: &RuntimeContext, order_id: &OrderId, reason: Option<&str>) -> AuditEntry {
    AuditEntry {
        id: Uuid::new_v4(),
        order_id: order_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        actor_id: ctx.actor_id.clone(),
        actor_email: ctx.actor_email.clone(),
        action: AuditAction::Create,
        field: None,
        old_value: None,
        new_value: None,
        reason: reason.map(str::to_string),
        timestamp: Utc::now(),
    }
}

/// One entry per field whose text form changed between `before` and `after`.
pub fn diff_entries(
    ctx: &RuntimeContext,
    order_id: &OrderId,
    before: &OrderFields,
    after: &OrderFields,
    action: AuditAction,
    reason: Option<&str>,
) -> Vec<AuditEntry> {
    let timestamp = Utc::now();
    before
        .changed_fields(after)
        .into_iter()
        .map(|field| AuditEntry {
            id: Uuid::new_v4(),
            order_id: order_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            actor_id: ctx.actor_id.clone(),
            actor_email: ctx.actor_email.clone(),
            action,
            field: Some(field.name().to_string()),
            old_value: before.value_of(field),
            new_value: after.value_of(field),
            reason: reason.map(str::to_string),
            timestamp,
        })
        .collect()
}
