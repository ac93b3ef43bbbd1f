use super::{OrderStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use poflow_model::{
    AuditEntry, DeliveryRecord, Department, NewSupplier, Order, OrderFields, OrderId, OrderKey, Supplier,
    TenantId,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    orders: Vec<Order>,
    departments: Vec<Department>,
    suppliers: Vec<Supplier>,
    audit: Vec<AuditEntry>,
    deliveries: Vec<DeliveryRecord>,
}

/// Process-local store. Same semantics as the SQLite store, including
/// uniqueness of department names and supplier codes per tenant.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<Tables>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Tables::default())),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.data
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }

    fn keys_matching<F>(&self, tenant: &TenantId, wanted: &[String], key_of: F) -> Result<Vec<OrderKey>, StoreError>
    where
        F: Fn(&Order) -> Option<&String>,
    {
        if wanted.is_empty() {
            return Ok(vec![]);
        }
        let wanted: HashSet<&String> = wanted.iter().collect();
        let data = self.tables()?;
        Ok(data
            .orders
            .iter()
            .filter(|o| &o.tenant_id == tenant)
            .filter(|o| key_of(*o).is_some_and(|k| wanted.contains(k)))
            .map(OrderKey::from)
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn orders_by_po_numbers(&self, tenant: &TenantId, po_numbers: &[String]) -> Result<Vec<OrderKey>, StoreError> {
        self.keys_matching(tenant, po_numbers, |o| o.fields.purchase_order_number.as_ref())
    }

    async fn orders_by_requisition_numbers(
        &self,
        tenant: &TenantId,
        requisitions: &[String],
    ) -> Result<Vec<OrderKey>, StoreError> {
        self.keys_matching(tenant, requisitions, |o| o.fields.requisition_number.as_ref())
    }

    async fn get_order(&self, tenant: &TenantId, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let data = self.tables()?;
        Ok(data
            .orders
            .iter()
            .find(|o| &o.id == id && &o.tenant_id == tenant)
            .cloned())
    }

    async fn list_orders(&self, tenant: &TenantId) -> Result<Vec<Order>, StoreError> {
        let data = self.tables()?;
        Ok(data.orders.iter().filter(|o| &o.tenant_id == tenant).cloned().collect())
    }

    async fn insert_order(&self, tenant: &TenantId, fields: OrderFields) -> Result<Order, StoreError> {
        let mut data = self.tables()?;
        let now = Utc::now();
        let order = Order {
            id: OrderId(Uuid::new_v4().to_string()),
            tenant_id: tenant.clone(),
            version: 1,
            fields,
            created_at: now,
            updated_at: now,
        };
        data.orders.push(order.clone());
        Ok(order)
    }

    async fn update_order(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        expected_version: i64,
        fields: OrderFields,
    ) -> Result<Order, StoreError> {
        let mut data = self.tables()?;
        let existing = data
            .orders
            .iter_mut()
            .find(|o| &o.id == id && &o.tenant_id == tenant)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", id)))?;

        if existing.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.clone(),
                expected: expected_version,
                found: existing.version,
            });
        }

        existing.fields = fields;
        existing.version += 1;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn find_department(&self, tenant: &TenantId, name: &str) -> Result<Option<Department>, StoreError> {
        let data = self.tables()?;
        let wanted = name.trim().to_lowercase();
        Ok(data
            .departments
            .iter()
            .find(|d| &d.tenant_id == tenant && d.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn insert_department(&self, tenant: &TenantId, name: &str) -> Result<Department, StoreError> {
        let mut data = self.tables()?;
        let name = name.trim();
        let wanted = name.to_lowercase();
        if data
            .departments
            .iter()
            .any(|d| &d.tenant_id == tenant && d.name.to_lowercase() == wanted)
        {
            return Err(StoreError::UniqueViolation(format!("department '{}'", name)));
        }
        let department = Department {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.clone(),
            name: name.to_string(),
        };
        data.departments.push(department.clone());
        Ok(department)
    }

    async fn find_supplier(&self, tenant: &TenantId, code: i64) -> Result<Option<Supplier>, StoreError> {
        let data = self.tables()?;
        Ok(data
            .suppliers
            .iter()
            .find(|s| &s.tenant_id == tenant && s.code == code)
            .cloned())
    }

    async fn insert_supplier(&self, tenant: &TenantId, supplier: NewSupplier) -> Result<Supplier, StoreError> {
        let mut data = self.tables()?;
        if data
            .suppliers
            .iter()
            .any(|s| &s.tenant_id == tenant && s.code == supplier.code)
        {
            return Err(StoreError::UniqueViolation(format!("supplier code {}", supplier.code)));
        }
        let created = Supplier {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.clone(),
            code: supplier.code,
            name: supplier.name,
            city: supplier.city,
            state: supplier.state,
        };
        data.suppliers.push(created.clone());
        Ok(created)
    }

    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        let mut data = self.tables()?;
        data.audit.extend_from_slice(entries);
        Ok(())
    }

    async fn audit_trail(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<AuditEntry>, StoreError> {
        let data = self.tables()?;
        Ok(data
            .audit
            .iter()
            .filter(|e| &e.tenant_id == tenant && &e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn append_delivery(&self, record: &DeliveryRecord) -> Result<(), StoreError> {
        let mut data = self.tables()?;
        data.deliveries.push(record.clone());
        Ok(())
    }

    async fn delivery_history(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<DeliveryRecord>, StoreError> {
        let data = self.tables()?;
        Ok(data
            .deliveries
            .iter()
            .filter(|d| &d.tenant_id == tenant && &d.order_id == order_id)
            .cloned()
            .collect())
    }
}
