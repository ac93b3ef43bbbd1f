//! Best-effort lookup-or-create of the side tables an order points at.
//!
//! Failures here never fail the order write: callers get `None` and fall
//! back to the plain text they already have.

use poflow_model::{Department, NewSupplier, Supplier, TenantId};
use tracing::{debug, warn};

use crate::store::{OrderStore, StoreError};

pub async fn resolve_department(store: &dyn OrderStore, tenant: &TenantId, name: &str) -> Option<Department> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match find_or_create_department(store, tenant, name).await {
        Ok(department) => Some(department),
        Err(e) => {
            warn!(tenant = %tenant, department = name, error = %e, "department unavailable, keeping plain text");
            None
        }
    }
}

async fn find_or_create_department(
    store: &dyn OrderStore,
    tenant: &TenantId,
    name: &str,
) -> Result<Department, StoreError> {
    if let Some(found) = store.find_department(tenant, name).await? {
        return Ok(found);
    }
    match store.insert_department(tenant, name).await {
        Ok(created) => {
            debug!(tenant = %tenant, department = name, "department created");
            Ok(created)
        }
        Err(StoreError::UniqueViolation(_)) => store
            .find_department(tenant, name)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("department '{}'", name))),
        Err(e) => Err(e),
    }
}

/// Finds the supplier by code, creating it from `template` when missing. A
/// concurrent creator winning the insert is resolved by fetching its row.
pub async fn resolve_supplier(store: &dyn OrderStore, tenant: &TenantId, template: NewSupplier) -> Option<Supplier> {
    let code = template.code;
    match find_or_create_supplier(store, tenant, template).await {
        Ok(supplier) => Some(supplier),
        Err(e) => {
            warn!(tenant = %tenant, supplier_code = code, error = %e, "supplier unavailable, order left without supplier");
            None
        }
    }
}

async fn find_or_create_supplier(
    store: &dyn OrderStore,
    tenant: &TenantId,
    template: NewSupplier,
) -> Result<Supplier, StoreError> {
    let code = template.code;
    if let Some(found) = store.find_supplier(tenant, code).await? {
        return Ok(found);
    }
    match store.insert_supplier(tenant, template).await {
        Ok(created) => {
            debug!(tenant = %tenant, supplier_code = code, "supplier created");
            Ok(created)
        }
        Err(StoreError::UniqueViolation(_)) => store
            .find_supplier(tenant, code)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("supplier code {}", code))),
        Err(e) => Err(e),
    }
}
