use poflow_model::TenantId;
use serde::{Deserialize, Serialize};

/// Who is acting, and on behalf of which tenant. Passed explicitly to every
/// operation; nothing in the runtime keeps a "current tenant".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeContext {
    pub tenant_id: TenantId,
    pub actor_id: String,
    pub actor_email: Option<String>,
}

impl RuntimeContext {
    pub fn new(tenant_id: impl Into<TenantId>, actor_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            actor_email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    pub fn system(tenant_id: impl Into<TenantId>) -> Self {
        Self::new(tenant_id, "system")
    }
}
