use crate::store::StoreError;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Bumped whenever a statement below changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const TABLES: &[(&str, &str)] = &[
    (
        "orders",
        r#"CREATE TABLE IF NOT EXISTS "orders" (
            "id" TEXT PRIMARY KEY,
            "tenant_id" TEXT NOT NULL,
            "version" INTEGER NOT NULL DEFAULT 1,
            "requisition_number" TEXT,
            "purchase_order_number" TEXT,
            "description" TEXT NOT NULL,
            "department" TEXT,
            "department_id" TEXT,
            "equipment_code" TEXT,
            "material_code" TEXT,
            "supplier_id" TEXT,
            "quantity_requested" TEXT NOT NULL,
            "quantity_delivered" TEXT NOT NULL,
            "status" TEXT NOT NULL,
            "requested_date" TEXT,
            "po_date" TEXT,
            "expected_delivery_date" TEXT,
            "actual_delivery_date" TEXT,
            "unit_price" TEXT,
            "last_purchase_price" TEXT,
            "value_total" TEXT NOT NULL,
            "created_at" TEXT NOT NULL,
            "updated_at" TEXT NOT NULL
        )"#,
    ),
    (
        "departments",
        r#"CREATE TABLE IF NOT EXISTS "departments" (
            "id" TEXT PRIMARY KEY,
            "tenant_id" TEXT NOT NULL,
            "name" TEXT NOT NULL
        )"#,
    ),
    (
        "suppliers",
        r#"CREATE TABLE IF NOT EXISTS "suppliers" (
            "id" TEXT PRIMARY KEY,
            "tenant_id" TEXT NOT NULL,
            "code" INTEGER NOT NULL,
            "name" TEXT,
            "city" TEXT,
            "state" TEXT,
            UNIQUE ("tenant_id", "code")
        )"#,
    ),
    (
        "audit_log",
        r#"CREATE TABLE IF NOT EXISTS "audit_log" (
            "id" TEXT PRIMARY KEY,
            "order_id" TEXT NOT NULL,
            "tenant_id" TEXT NOT NULL,
            "actor_id" TEXT NOT NULL,
            "actor_email" TEXT,
            "action" TEXT NOT NULL,
            "field" TEXT,
            "old_value" TEXT,
            "new_value" TEXT,
            "reason" TEXT,
            "timestamp" TEXT NOT NULL
        )"#,
    ),
    (
        "delivery_history",
        r#"CREATE TABLE IF NOT EXISTS "delivery_history" (
            "id" TEXT PRIMARY KEY,
            "order_id" TEXT NOT NULL,
            "tenant_id" TEXT NOT NULL,
            "quantity" TEXT NOT NULL,
            "delivery_date" TEXT NOT NULL,
            "note" TEXT,
            "delivered_after" TEXT NOT NULL,
            "actor_id" TEXT NOT NULL,
            "recorded_at" TEXT NOT NULL
        )"#,
    ),
];

const INDEXES: &[&str] = &[
    r#"CREATE INDEX IF NOT EXISTS "idx_orders_tenant_po" ON "orders" ("tenant_id", "purchase_order_number")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_orders_tenant_req" ON "orders" ("tenant_id", "requisition_number")"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_departments_tenant_name" ON "departments" ("tenant_id", lower("name"))"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_audit_tenant_order" ON "audit_log" ("tenant_id", "order_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "idx_deliveries_tenant_order" ON "delivery_history" ("tenant_id", "order_id")"#,
];

pub struct SchemaManager {
    pool: SqlitePool,
}

impl SchemaManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates whatever is missing. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("checking order store schema");
        self.create_metadata_table().await?;

        for (name, sql) in TABLES {
            debug!(table = *name, "ensuring table");
            sqlx::query(*sql).execute(&self.pool).await?;
        }
        for sql in INDEXES {
            sqlx::query(*sql).execute(&self.pool).await?;
        }

        let stored = self.stored_version().await?;
        if stored != Some(SCHEMA_VERSION) {
            sqlx::query(r#"INSERT OR REPLACE INTO "_poflow_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
                .bind(SCHEMA_VERSION.to_string())
                .execute(&self.pool)
                .await?;
            info!(from = ?stored, to = SCHEMA_VERSION, "schema version recorded");
        }

        info!("order store schema ready");
        Ok(())
    }

    async fn create_metadata_table(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS "_poflow_metadata" (
                "key" TEXT PRIMARY KEY,
                "value" TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn stored_version(&self) -> Result<Option<i64>, StoreError> {
        let raw: Option<String> =
            sqlx::query_scalar(r#"SELECT "value" FROM "_poflow_metadata" WHERE "key" = 'schema_version'"#)
                .fetch_optional(&self.pool)
                .await?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }
}
