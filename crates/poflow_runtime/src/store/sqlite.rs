use super::{OrderStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use poflow_model::{
    AuditAction, AuditEntry, DeliveryRecord, Department, NewSupplier, Order, OrderFields, OrderId, OrderKey,
    OrderStatus, Supplier, TenantId,
};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Keys per `IN (...)` clause; keeps well under SQLite's bound-parameter limit.
const KEY_CHUNK: usize = 500;

const ORDER_COLUMNS: &str = "id, tenant_id, version, requisition_number, purchase_order_number, description, \
     department, department_id, equipment_code, material_code, supplier_id, quantity_requested, \
     quantity_delivered, status, requested_date, po_date, expected_delivery_date, actual_delivery_date, \
     unit_price, last_purchase_price, value_total, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn keys_where(&self, tenant: &TenantId, column: &str, wanted: &[String]) -> Result<Vec<OrderKey>, StoreError> {
        let mut keys = Vec::new();
        for chunk in wanted.chunks(KEY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT id, purchase_order_number, requisition_number, value_total FROM orders \
                 WHERE tenant_id = ? AND {} IN ({}) ORDER BY created_at, rowid",
                column, placeholders
            );
            let mut q = sqlx::query::<sqlx::Sqlite>(&sql).bind(tenant.as_str());
            for key in chunk {
                q = q.bind(key);
            }
            for row in q.fetch_all(&self.pool).await? {
                keys.push(OrderKey {
                    id: OrderId(row.try_get("id")?),
                    purchase_order_number: row.try_get("purchase_order_number")?,
                    requisition_number: row.try_get("requisition_number")?,
                    value_total: decimal(&row, "value_total")?,
                });
            }
        }
        Ok(keys)
    }
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Database(format!("unreadable value '{}' in column {}", value, column))
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|_| corrupt(column, &raw))
}

fn opt_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StoreError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|r| Decimal::from_str(&r).map_err(|_| corrupt(column, &r)))
        .transpose()
}

fn opt_date(row: &SqliteRow, column: &str) -> Result<Option<NaiveDate>, StoreError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|r| NaiveDate::parse_from_str(&r, "%Y-%m-%d").map_err(|_| corrupt(column, &r)))
        .transpose()
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(column, &raw))
}

fn date_text(d: &Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

fn dec_text(d: &Option<Decimal>) -> Option<String> {
    d.map(|d| d.normalize().to_string())
}

fn row_to_order(row: &SqliteRow) -> Result<Order, StoreError> {
    let status_raw: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_raw).ok_or_else(|| corrupt("status", &status_raw))?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        version: row.try_get("version")?,
        fields: OrderFields {
            requisition_number: row.try_get("requisition_number")?,
            purchase_order_number: row.try_get("purchase_order_number")?,
            description: row.try_get("description")?,
            department: row.try_get("department")?,
            department_id: row.try_get("department_id")?,
            equipment_code: row.try_get("equipment_code")?,
            material_code: row.try_get("material_code")?,
            supplier_id: row.try_get("supplier_id")?,
            quantity_requested: decimal(row, "quantity_requested")?,
            quantity_delivered: decimal(row, "quantity_delivered")?,
            status,
            requested_date: opt_date(row, "requested_date")?,
            po_date: opt_date(row, "po_date")?,
            expected_delivery_date: opt_date(row, "expected_delivery_date")?,
            actual_delivery_date: opt_date(row, "actual_delivery_date")?,
            unit_price: opt_decimal(row, "unit_price")?,
            last_purchase_price: opt_decimal(row, "last_purchase_price")?,
            value_total: decimal(row, "value_total")?,
        },
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn row_to_audit(row: &SqliteRow) -> Result<AuditEntry, StoreError> {
    let id_raw: String = row.try_get("id")?;
    let action_raw: String = row.try_get("action")?;
    Ok(AuditEntry {
        id: Uuid::parse_str(&id_raw).map_err(|_| corrupt("id", &id_raw))?,
        order_id: OrderId(row.try_get("order_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        actor_id: row.try_get("actor_id")?,
        actor_email: row.try_get("actor_email")?,
        action: AuditAction::parse(&action_raw).ok_or_else(|| corrupt("action", &action_raw))?,
        field: row.try_get("field")?,
        old_value: row.try_get("old_value")?,
        new_value: row.try_get("new_value")?,
        reason: row.try_get("reason")?,
        timestamp: timestamp(row, "timestamp")?,
    })
}

fn row_to_delivery(row: &SqliteRow) -> Result<DeliveryRecord, StoreError> {
    let id_raw: String = row.try_get("id")?;
    let date_raw: String = row.try_get("delivery_date")?;
    Ok(DeliveryRecord {
        id: Uuid::parse_str(&id_raw).map_err(|_| corrupt("id", &id_raw))?,
        order_id: OrderId(row.try_get("order_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        quantity: decimal(row, "quantity")?,
        delivery_date: NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|_| corrupt("delivery_date", &date_raw))?,
        note: row.try_get("note")?,
        delivered_after: decimal(row, "delivered_after")?,
        actor_id: row.try_get("actor_id")?,
        recorded_at: timestamp(row, "recorded_at")?,
    })
}

fn row_to_supplier(row: &SqliteRow) -> Result<Supplier, StoreError> {
    Ok(Supplier {
        id: row.try_get("id")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
    })
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn orders_by_po_numbers(&self, tenant: &TenantId, po_numbers: &[String]) -> Result<Vec<OrderKey>, StoreError> {
        self.keys_where(tenant, "purchase_order_number", po_numbers).await
    }

    async fn orders_by_requisition_numbers(
        &self,
        tenant: &TenantId,
        requisitions: &[String],
    ) -> Result<Vec<OrderKey>, StoreError> {
        self.keys_where(tenant, "requisition_number", requisitions).await
    }

    async fn get_order(&self, tenant: &TenantId, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {} FROM orders WHERE tenant_id = ? AND id = ?", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn list_orders(&self, tenant: &TenantId) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE tenant_id = ? ORDER BY created_at, rowid",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(tenant.as_str()).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_order).collect()
    }

    async fn insert_order(&self, tenant: &TenantId, fields: OrderFields) -> Result<Order, StoreError> {
        let id = OrderId(Uuid::new_v4().to_string());
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO orders ({}) VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ORDER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(id.as_str())
            .bind(tenant.as_str())
            .bind(&fields.requisition_number)
            .bind(&fields.purchase_order_number)
            .bind(&fields.description)
            .bind(&fields.department)
            .bind(&fields.department_id)
            .bind(&fields.equipment_code)
            .bind(&fields.material_code)
            .bind(&fields.supplier_id)
            .bind(fields.quantity_requested.normalize().to_string())
            .bind(fields.quantity_delivered.normalize().to_string())
            .bind(fields.status.code())
            .bind(date_text(&fields.requested_date))
            .bind(date_text(&fields.po_date))
            .bind(date_text(&fields.expected_delivery_date))
            .bind(date_text(&fields.actual_delivery_date))
            .bind(dec_text(&fields.unit_price))
            .bind(dec_text(&fields.last_purchase_price))
            .bind(fields.value_total.normalize().to_string())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(Order {
            id,
            tenant_id: tenant.clone(),
            version: 1,
            fields,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_order(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        expected_version: i64,
        fields: OrderFields,
    ) -> Result<Order, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE orders SET version = version + 1, requisition_number = ?, purchase_order_number = ?, \
             description = ?, department = ?, department_id = ?, equipment_code = ?, material_code = ?, \
             supplier_id = ?, quantity_requested = ?, quantity_delivered = ?, status = ?, requested_date = ?, \
             po_date = ?, expected_delivery_date = ?, actual_delivery_date = ?, unit_price = ?, \
             last_purchase_price = ?, value_total = ?, updated_at = ? \
             WHERE tenant_id = ? AND id = ? AND version = ?",
        )
        .bind(&fields.requisition_number)
        .bind(&fields.purchase_order_number)
        .bind(&fields.description)
        .bind(&fields.department)
        .bind(&fields.department_id)
        .bind(&fields.equipment_code)
        .bind(&fields.material_code)
        .bind(&fields.supplier_id)
        .bind(fields.quantity_requested.normalize().to_string())
        .bind(fields.quantity_delivered.normalize().to_string())
        .bind(fields.status.code())
        .bind(date_text(&fields.requested_date))
        .bind(date_text(&fields.po_date))
        .bind(date_text(&fields.expected_delivery_date))
        .bind(date_text(&fields.actual_delivery_date))
        .bind(dec_text(&fields.unit_price))
        .bind(dec_text(&fields.last_purchase_price))
        .bind(fields.value_total.normalize().to_string())
        .bind(now.to_rfc3339())
        .bind(tenant.as_str())
        .bind(id.as_str())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let found: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE tenant_id = ? AND id = ?")
                .bind(tenant.as_str())
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match found {
                Some(found) => StoreError::VersionConflict {
                    id: id.clone(),
                    expected: expected_version,
                    found,
                },
                None => StoreError::NotFound(format!("order {}", id)),
            });
        }

        self.get_order(tenant, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("order {}", id)))
    }

    async fn find_department(&self, tenant: &TenantId, name: &str) -> Result<Option<Department>, StoreError> {
        let row = sqlx::query("SELECT id, tenant_id, name FROM departments WHERE tenant_id = ? AND lower(name) = lower(?)")
            .bind(tenant.as_str())
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Department {
                id: row.try_get("id")?,
                tenant_id: TenantId(row.try_get("tenant_id")?),
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_department(&self, tenant: &TenantId, name: &str) -> Result<Department, StoreError> {
        let department = Department {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.clone(),
            name: name.trim().to_string(),
        };
        sqlx::query("INSERT INTO departments (id, tenant_id, name) VALUES (?, ?, ?)")
            .bind(&department.id)
            .bind(tenant.as_str())
            .bind(&department.name)
            .execute(&self.pool)
            .await?;
        Ok(department)
    }

    async fn find_supplier(&self, tenant: &TenantId, code: i64) -> Result<Option<Supplier>, StoreError> {
        let row = sqlx::query("SELECT id, tenant_id, code, name, city, state FROM suppliers WHERE tenant_id = ? AND code = ?")
            .bind(tenant.as_str())
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_supplier).transpose()
    }

    async fn insert_supplier(&self, tenant: &TenantId, supplier: NewSupplier) -> Result<Supplier, StoreError> {
        let created = Supplier {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.clone(),
            code: supplier.code,
            name: supplier.name,
            city: supplier.city,
            state: supplier.state,
        };
        sqlx::query("INSERT INTO suppliers (id, tenant_id, code, name, city, state) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(&created.id)
            .bind(tenant.as_str())
            .bind(created.code)
            .bind(&created.name)
            .bind(&created.city)
            .bind(&created.state)
            .execute(&self.pool)
            .await?;
        Ok(created)
    }

    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        for entry in entries {
            sqlx::query(
                "INSERT INTO audit_log (id, order_id, tenant_id, actor_id, actor_email, action, field, \
                 old_value, new_value, reason, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.id.to_string())
            .bind(entry.order_id.as_str())
            .bind(entry.tenant_id.as_str())
            .bind(&entry.actor_id)
            .bind(&entry.actor_email)
            .bind(entry.action.as_str())
            .bind(&entry.field)
            .bind(&entry.old_value)
            .bind(&entry.new_value)
            .bind(&entry.reason)
            .bind(entry.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn audit_trail(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, order_id, tenant_id, actor_id, actor_email, action, field, old_value, new_value, reason, \
             timestamp FROM audit_log WHERE tenant_id = ? AND order_id = ? ORDER BY rowid",
        )
        .bind(tenant.as_str())
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_audit).collect()
    }

    async fn append_delivery(&self, record: &DeliveryRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO delivery_history (id, order_id, tenant_id, quantity, delivery_date, note, \
             delivered_after, actor_id, recorded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.order_id.as_str())
        .bind(record.tenant_id.as_str())
        .bind(record.quantity.normalize().to_string())
        .bind(record.delivery_date.format("%Y-%m-%d").to_string())
        .bind(&record.note)
        .bind(record.delivered_after.normalize().to_string())
        .bind(&record.actor_id)
        .bind(record.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delivery_history(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<DeliveryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, order_id, tenant_id, quantity, delivery_date, note, delivered_after, actor_id, recorded_at \
             FROM delivery_history WHERE tenant_id = ? AND order_id = ? ORDER BY rowid",
        )
        .bind(tenant.as_str())
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_delivery).collect()
    }
}
