use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{OrderId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Edit,
    Delivery,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Edit => "edit",
            AuditAction::Delivery => "delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(AuditAction::Create),
            "edit" => Some(AuditAction::Edit),
            "delivery" => Some(AuditAction::Delivery),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one field-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub actor_id: String,
    pub actor_email: Option<String>,
    pub action: AuditAction,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One partial delivery, kept for the delivery-history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub quantity: Decimal,
    pub delivery_date: NaiveDate,
    pub note: Option<String>,
    /// Cumulative delivered quantity right after this delivery.
    pub delivered_after: Decimal,
    pub actor_id: String,
    pub recorded_at: DateTime<Utc>,
}
