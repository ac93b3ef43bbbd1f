use async_trait::async_trait;
use poflow_model::{
    AuditEntry, DeliveryRecord, Department, NewSupplier, Order, OrderFields, OrderId, OrderKey, Supplier,
    TenantId,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::persistence::SchemaManager;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("order '{id}' was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict { id: OrderId, expected: i64, found: i64 },
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation(db.message().to_string()),
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// The only way the core talks to persistence. Every call is scoped by
/// tenant and is atomic on its own; there is no multi-call transaction.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Key projection of the tenant's orders whose PO number is in `po_numbers`.
    async fn orders_by_po_numbers(&self, tenant: &TenantId, po_numbers: &[String]) -> Result<Vec<OrderKey>, StoreError>;
    /// Key projection of the tenant's orders whose requisition is in `requisitions`.
    async fn orders_by_requisition_numbers(
        &self,
        tenant: &TenantId,
        requisitions: &[String],
    ) -> Result<Vec<OrderKey>, StoreError>;
    async fn get_order(&self, tenant: &TenantId, id: &OrderId) -> Result<Option<Order>, StoreError>;
    async fn list_orders(&self, tenant: &TenantId) -> Result<Vec<Order>, StoreError>;
    /// Stores a new order; the store assigns the id and starts at version 1.
    async fn insert_order(&self, tenant: &TenantId, fields: OrderFields) -> Result<Order, StoreError>;
    /// Replaces the order's fields if its stored version still equals
    /// `expected_version`, bumping the version.
    async fn update_order(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        expected_version: i64,
        fields: OrderFields,
    ) -> Result<Order, StoreError>;
    /// Case-insensitive lookup by name.
    async fn find_department(&self, tenant: &TenantId, name: &str) -> Result<Option<Department>, StoreError>;
    async fn insert_department(&self, tenant: &TenantId, name: &str) -> Result<Department, StoreError>;
    async fn find_supplier(&self, tenant: &TenantId, code: i64) -> Result<Option<Supplier>, StoreError>;
    async fn insert_supplier(&self, tenant: &TenantId, supplier: NewSupplier) -> Result<Supplier, StoreError>;
    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError>;
    async fn audit_trail(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<AuditEntry>, StoreError>;
    async fn append_delivery(&self, record: &DeliveryRecord) -> Result<(), StoreError>;
    async fn delivery_history(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<DeliveryRecord>, StoreError>;
}

/// Opens the store named by `url`.
///
/// `memory` (or an empty string) gives a process-local store. `sqlite:` URLs
/// are resolved against `base_path` when relative; the file and its parent
/// directory are created on demand and the schema is migrated.
pub async fn init_store(url: &str, base_path: Option<&Path>) -> Result<Arc<dyn OrderStore>, StoreError> {
    let url = url.trim();
    if url.is_empty() || url == "memory" || url == "mem" {
        info!("using in-memory order store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    if !url.starts_with("sqlite:") && !url.starts_with("file:") {
        return Err(StoreError::Database(format!("unsupported database url: {}", url)));
    }

    let raw_path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    let in_memory = raw_path == ":memory:";
    let connect_url = if in_memory {
        "sqlite::memory:".to_string()
    } else {
        let file = prepare_db_file(Path::new(raw_path), base_path)?;
        format!("sqlite://{}", file.display())
    };

    // Each connection to :memory: is a separate database.
    let max_connections = if in_memory { 1 } else { 5 };

    info!(url = %connect_url, "connecting to sqlite order store");
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&connect_url)
        .await
        .map_err(|e| StoreError::Database(format!("failed to connect to {}: {}", connect_url, e)))?;

    SchemaManager::new(pool.clone()).migrate().await?;

    Ok(Arc::new(SqliteStore::new(pool)))
}

/// Absolute path of the database file, created empty (with its directory)
/// when missing.
fn prepare_db_file(path: &Path, base_path: Option<&Path>) -> Result<PathBuf, StoreError> {
    let io = |e: std::io::Error| StoreError::Database(format!("{}: {}", path.display(), e));

    let joined = match base_path {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    let file = if joined.is_absolute() {
        joined
    } else {
        std::env::current_dir().map_err(io)?.join(joined)
    };

    if let Some(dir) = file.parent() {
        std::fs::create_dir_all(dir).map_err(io)?;
    }
    if !file.exists() {
        std::fs::File::create(&file).map_err(io)?;
    }
    Ok(file)
}
