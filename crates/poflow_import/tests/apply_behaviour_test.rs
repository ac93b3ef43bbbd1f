use async_trait::async_trait;
use poflow_import::source::read_csv_str;
use poflow_import::{ApplyObserver, ImportOptions, Importer, NoopObserver, RowAction, RowLogEntry};
use poflow_model::{
    AuditEntry, DeliveryRecord, Department, NewSupplier, Order, OrderFields, OrderId, OrderKey, Supplier, TenantId,
};
use poflow_runtime::{MemoryStore, OrderStore, RuntimeContext, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Delegates to a memory store; optionally fails department writes and
/// hides suppliers from the first lookup.
struct FlakyStore {
    inner: MemoryStore,
    fail_departments: bool,
    hidden_supplier_lookups: AtomicUsize,
    fail_audit: bool,
}

impl FlakyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_departments: false,
            hidden_supplier_lookups: AtomicUsize::new(0),
            fail_audit: false,
        }
    }
}

#[async_trait]
impl OrderStore for FlakyStore {
    async fn orders_by_po_numbers(&self, tenant: &TenantId, po_numbers: &[String]) -> Result<Vec<OrderKey>, StoreError> {
        self.inner.orders_by_po_numbers(tenant, po_numbers).await
    }

    async fn orders_by_requisition_numbers(
        &self,
        tenant: &TenantId,
        requisitions: &[String],
    ) -> Result<Vec<OrderKey>, StoreError> {
        self.inner.orders_by_requisition_numbers(tenant, requisitions).await
    }

    async fn get_order(&self, tenant: &TenantId, id: &OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.get_order(tenant, id).await
    }

    async fn list_orders(&self, tenant: &TenantId) -> Result<Vec<Order>, StoreError> {
        self.inner.list_orders(tenant).await
    }

    async fn insert_order(&self, tenant: &TenantId, fields: OrderFields) -> Result<Order, StoreError> {
        self.inner.insert_order(tenant, fields).await
    }

    async fn update_order(
        &self,
        tenant: &TenantId,
        id: &OrderId,
        expected_version: i64,
        fields: OrderFields,
    ) -> Result<Order, StoreError> {
        self.inner.update_order(tenant, id, expected_version, fields).await
    }

    async fn find_department(&self, tenant: &TenantId, name: &str) -> Result<Option<Department>, StoreError> {
        if self.fail_departments {
            return Err(StoreError::Database("departments table unavailable".to_string()));
        }
        self.inner.find_department(tenant, name).await
    }

    async fn insert_department(&self, tenant: &TenantId, name: &str) -> Result<Department, StoreError> {
        if self.fail_departments {
            return Err(StoreError::Database("departments table unavailable".to_string()));
        }
        self.inner.insert_department(tenant, name).await
    }

    async fn find_supplier(&self, tenant: &TenantId, code: i64) -> Result<Option<Supplier>, StoreError> {
        let hidden = self.hidden_supplier_lookups.load(Ordering::SeqCst);
        if hidden > 0 {
            self.hidden_supplier_lookups.store(hidden - 1, Ordering::SeqCst);
            return Ok(None);
        }
        self.inner.find_supplier(tenant, code).await
    }

    async fn insert_supplier(&self, tenant: &TenantId, supplier: NewSupplier) -> Result<Supplier, StoreError> {
        self.inner.insert_supplier(tenant, supplier).await
    }

    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        if self.fail_audit {
            return Err(StoreError::Database("audit log is read-only".to_string()));
        }
        self.inner.append_audit(entries).await
    }

    async fn audit_trail(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<AuditEntry>, StoreError> {
        self.inner.audit_trail(tenant, order_id).await
    }

    async fn append_delivery(&self, record: &DeliveryRecord) -> Result<(), StoreError> {
        self.inner.append_delivery(record).await
    }

    async fn delivery_history(&self, tenant: &TenantId, order_id: &OrderId) -> Result<Vec<DeliveryRecord>, StoreError> {
        self.inner.delivery_history(tenant, order_id).await
    }
}

#[derive(Default)]
struct Recorder {
    rows: Mutex<Vec<RowLogEntry>>,
    progress: Mutex<Vec<(usize, usize)>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ApplyObserver for Recorder {
    fn on_row(&self, entry: &RowLogEntry) {
        let mut rows = self.rows.lock().unwrap();
        rows.push(entry.clone());
        if let Some((after, token)) = &self.cancel_after
            && rows.len() == *after
        {
            token.cancel();
        }
    }

    fn on_progress(&self, done: usize, total: usize) {
        self.progress.lock().unwrap().push((done, total));
    }
}

fn ctx() -> RuntimeContext {
    RuntimeContext::new("acme", "importador")
}

fn five_rows() -> String {
    let mut text = String::from("nr_oc,descricao,qtde_solicitada,valor_total\n");
    for i in 1..=5 {
        text.push_str(&format!("OC-{},Item {},1,{}\n", i, i, i * 10));
    }
    text
}

#[tokio::test]
async fn test_department_failure_keeps_plain_text() {
    let mut flaky = FlakyStore::new(MemoryStore::new());
    flaky.fail_departments = true;
    let store: Arc<dyn OrderStore> = Arc::new(flaky);

    let batch = read_csv_str("nr_oc;departamento;descricao;qtde_solicitada\nOC-1;Elétrica;Cabo;3\n").unwrap();
    let result = Importer::new(store.clone(), ImportOptions::default())
        .run(&ctx(), &batch, &NoopObserver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.inserted, 1);
    assert!(result.warnings.iter().any(|w| w.message.contains("kept as plain text")));
    let orders = store.list_orders(&ctx().tenant_id).await.unwrap();
    assert_eq!(orders[0].fields.department.as_deref(), Some("Elétrica"));
    assert_eq!(orders[0].fields.department_id, None);
}

#[tokio::test]
async fn test_supplier_created_concurrently_is_reused() {
    let inner = MemoryStore::new();
    let tenant = ctx().tenant_id;
    let existing = inner
        .insert_supplier(
            &tenant,
            NewSupplier {
                code: 42,
                name: Some("Parafusos Ltda".to_string()),
                city: None,
                state: None,
            },
        )
        .await
        .unwrap();

    let flaky = FlakyStore::new(inner);
    flaky.hidden_supplier_lookups.store(1, Ordering::SeqCst);
    let store: Arc<dyn OrderStore> = Arc::new(flaky);

    let batch = read_csv_str("nr_oc;descricao;qtde_solicitada;cod_fornecedor\nOC-1;Porca;10;42\n").unwrap();
    let result = Importer::new(store.clone(), ImportOptions::default())
        .run(&ctx(), &batch, &NoopObserver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.inserted, 1);
    assert!(result.warnings.is_empty());
    let orders = store.list_orders(&tenant).await.unwrap();
    assert_eq!(orders[0].fields.supplier_id.as_ref(), Some(&existing.id));
}

#[tokio::test]
async fn test_audit_failure_is_a_warning() {
    let mut flaky = FlakyStore::new(MemoryStore::new());
    flaky.fail_audit = true;
    let store: Arc<dyn OrderStore> = Arc::new(flaky);

    let batch = read_csv_str(&five_rows()).unwrap();
    let result = Importer::new(store.clone(), ImportOptions::default())
        .run(&ctx(), &batch, &NoopObserver, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.inserted, 5);
    assert_eq!(result.errors, 0);
    assert_eq!(result.warnings.len(), 5);
    assert!(result.warnings[0].message.starts_with("audit not recorded"));
}

#[tokio::test]
async fn test_pre_cancelled_run_writes_nothing() {
    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
    let token = CancellationToken::new();
    token.cancel();

    let batch = read_csv_str(&five_rows()).unwrap();
    let result = Importer::new(store.clone(), ImportOptions::default())
        .run(&ctx(), &batch, &NoopObserver, &token)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.processed, 0);
    assert!(store.list_orders(&ctx().tenant_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_between_rows_keeps_finished_rows() {
    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
    let token = CancellationToken::new();
    let recorder = Recorder {
        cancel_after: Some((2, token.clone())),
        ..Default::default()
    };

    let batch = read_csv_str(&five_rows()).unwrap();
    let result = Importer::new(store.clone(), ImportOptions::default())
        .run(&ctx(), &batch, &recorder, &token)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.processed, 2);
    assert_eq!(result.inserted, 2);
    assert_eq!(store.list_orders(&ctx().tenant_id).await.unwrap().len(), 2);
    assert_eq!(recorder.rows.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_observer_sees_rows_and_progress() {
    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
    let recorder = Recorder::default();
    let options = ImportOptions {
        progress_every: 2,
        ..Default::default()
    };

    let batch = read_csv_str(&five_rows()).unwrap();
    let result = Importer::new(store, options)
        .run(&ctx(), &batch, &recorder, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.processed, 5);
    let rows = recorder.rows.lock().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.action == RowAction::Inserted));
    assert_eq!(rows.iter().map(|r| r.line).collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
    assert_eq!(*recorder.progress.lock().unwrap(), vec![(2, 5), (4, 5), (5, 5)]);
}

#[tokio::test]
async fn test_preview_does_not_write() {
    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
    let importer = Importer::new(store.clone(), ImportOptions::default());
    let batch = read_csv_str(&five_rows()).unwrap();

    let plan = importer.preview(&ctx(), &batch).await.unwrap();
    assert_eq!(plan.summary.to_insert, 5);
    assert_eq!(plan.rows.len(), 5);
    assert!(store.list_orders(&ctx().tenant_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_path_reads_latin1_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pedidos.csv");
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("nr_oc;descricao;qtde_solicitada;valor_total\nOC-77;Válvula de pressão;2;1.250,50\n");
    std::fs::write(&path, bytes).unwrap();

    let store: Arc<dyn OrderStore> = Arc::new(MemoryStore::new());
    let result = Importer::new(store.clone(), ImportOptions::default())
        .run_path(&ctx(), &path)
        .await
        .unwrap();

    assert_eq!(result.inserted, 1);
    let orders = store.list_orders(&ctx().tenant_id).await.unwrap();
    assert_eq!(orders[0].fields.description, "Válvula de pressão");
    assert_eq!(orders[0].fields.value_total, rust_decimal_macros::dec!(1250.50));
}
