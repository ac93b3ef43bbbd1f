use chrono::{NaiveDate, Utc};
use poflow_import::source::read_csv_str;
use poflow_import::{ImportError, ImportOptions, Importer, NoopObserver, RowAction};
use poflow_model::{AuditAction, OrderStatus, TenantId};
use poflow_runtime::{DeliveryLedger, MemoryStore, OrderStore, RuntimeContext};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const HEADER: &str = "nr_solicitacao;nr_oc;departamento;descricao;qtde_solicitada;cod_fornecedor;nome_fornecedor;data_solicitacao;status;valor_total";

fn csv(lines: &[&str]) -> String {
    let mut text = HEADER.to_string();
    for line in lines {
        text.push('\n');
        text.push_str(line);
    }
    text.push('\n');
    text
}

fn setup() -> (Arc<dyn OrderStore>, RuntimeContext) {
    (Arc::new(MemoryStore::new()), RuntimeContext::new("acme", "importador"))
}

async fn import(
    store: &Arc<dyn OrderStore>,
    ctx: &RuntimeContext,
    options: ImportOptions,
    lines: &[&str],
) -> Result<poflow_import::ImportResult, ImportError> {
    let batch = read_csv_str(&csv(lines)).unwrap();
    Importer::new(store.clone(), options)
        .run(ctx, &batch, &NoopObserver, &CancellationToken::new())
        .await
}

async fn order_by_po(store: &Arc<dyn OrderStore>, tenant: &TenantId, po: &str) -> poflow_model::Order {
    let keys = store.orders_by_po_numbers(tenant, &[po.to_string()]).await.unwrap();
    assert_eq!(keys.len(), 1, "expected exactly one order for {}", po);
    store.get_order(tenant, &keys[0].id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_insert_then_reimport_with_changed_total() {
    let (store, ctx) = setup();

    let first = import(
        &store,
        &ctx,
        ImportOptions::default(),
        &["SC-1;OC-1;Manutencao;Luva nitrilica;10;501;Ferragens Silva;01/03/2024;;100,00"],
    )
    .await
    .unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.inserted, 1);
    assert_eq!(first.log[0].action, RowAction::Inserted);

    let order = order_by_po(&store, &ctx.tenant_id, "OC-1").await;
    assert_eq!(order.fields.status, OrderStatus::HasPo);
    assert_eq!(order.fields.value_total, dec!(100));
    assert_eq!(order.fields.requested_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert!(order.fields.department_id.is_some());
    assert!(order.fields.supplier_id.is_some());
    assert_eq!(first.log[0].order_id.as_ref(), Some(&order.id));

    let second = import(
        &store,
        &ctx,
        ImportOptions::default(),
        &["SC-1;OC-1;Manutencao;Luva nitrilica;10;501;Ferragens Silva;01/03/2024;;150,00"],
    )
    .await
    .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.value_changed, 1);

    let trail = store.audit_trail(&ctx.tenant_id, &order.id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, AuditAction::Create);
    assert_eq!(trail[1].field.as_deref(), Some("valor_total"));
    assert_eq!(trail[1].old_value.as_deref(), Some("100"));
    assert_eq!(trail[1].new_value.as_deref(), Some("150"));
    assert_eq!(trail[1].reason.as_deref(), Some("import line 2"));
}

#[tokio::test]
async fn test_delivered_order_with_reduced_quantity_is_rejected() {
    let (store, ctx) = setup();
    import(&store, &ctx, ImportOptions::default(), &[";OC-2;;Cabo PP;10;;;;Em Transporte;80"])
        .await
        .unwrap();
    let order = order_by_po(&store, &ctx.tenant_id, "OC-2").await;
    DeliveryLedger::new(store.clone())
        .register_delivery(&ctx, &order.id, dec!(10), Utc::now().date_naive(), None)
        .await
        .unwrap();

    let result = import(&store, &ctx, ImportOptions::default(), &[";OC-2;;Cabo PP;5;;;;;80"])
        .await
        .unwrap();
    assert_eq!(result.rejected, 1);
    assert_eq!(result.updated, 0);
    assert_eq!(result.log[0].action, RowAction::Rejected);
    assert!(result.row_errors[0].message.contains("requested quantity may not be reduced"));

    let after = order_by_po(&store, &ctx.tenant_id, "OC-2").await;
    assert_eq!(after.fields.quantity_requested, dec!(10));
    assert_eq!(after.fields.status, OrderStatus::Delivered);
    assert_eq!(after.version, order.version + 1);
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let (store, ctx) = setup();
    let lines = [
        "SC-10;OC-10;Almoxarifado;Parafuso;100;77;Metais SA;02/01/2024;;12,50",
        "SC-11;;Almoxarifado;Arruela;50;;;2024-01-03;;4",
        ";;Oficina;Graxa;2;;;;;30",
    ];
    let first = import(&store, &ctx, ImportOptions::default(), &lines).await.unwrap();
    assert_eq!(first.inserted, 3);

    let orders_before = store.list_orders(&ctx.tenant_id).await.unwrap();
    let audit_before: usize = {
        let mut n = 0;
        for o in &orders_before {
            n += store.audit_trail(&ctx.tenant_id, &o.id).await.unwrap().len();
        }
        n
    };

    let second = import(&store, &ctx, ImportOptions::default(), &lines[..2]).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(second.unchanged, 2);
    assert_eq!(second.value_changed, 0);

    let orders_after = store.list_orders(&ctx.tenant_id).await.unwrap();
    assert_eq!(orders_after, orders_before);
    let mut audit_after = 0;
    for o in &orders_after {
        audit_after += store.audit_trail(&ctx.tenant_id, &o.id).await.unwrap().len();
    }
    assert_eq!(audit_after, audit_before);
}

#[tokio::test]
async fn test_po_resolves_row_even_when_requisition_matches_other_order() {
    let (store, ctx) = setup();
    import(
        &store,
        &ctx,
        ImportOptions::default(),
        &["SC-1;OC-1;;Item A;1;;;;;10", "SC-2;;;Item B;1;;;;;10"],
    )
    .await
    .unwrap();

    let result = import(&store, &ctx, ImportOptions::default(), &["SC-2;OC-1;;Item A;1;;;;;10"])
        .await
        .unwrap();
    assert_eq!(result.updated, 1);

    let a = order_by_po(&store, &ctx.tenant_id, "OC-1").await;
    assert_eq!(a.fields.requisition_number.as_deref(), Some("SC-2"));

    let reqs = store
        .orders_by_requisition_numbers(&ctx.tenant_id, &["SC-2".to_string()])
        .await
        .unwrap();
    let b = reqs.iter().find(|k| k.purchase_order_number.is_none()).unwrap();
    let b = store.get_order(&ctx.tenant_id, &b.id).await.unwrap().unwrap();
    assert_eq!(b.fields.description, "Item B");
    assert_eq!(b.version, 1);
}

#[tokio::test]
async fn test_requisition_owned_by_po_is_superseded() {
    let (store, ctx) = setup();
    import(&store, &ctx, ImportOptions::default(), &["SC-5;OC-5;;Motor;1;;;;;900"])
        .await
        .unwrap();

    let result = import(&store, &ctx, ImportOptions::default(), &["SC-5;;;Motor antigo;3;;;;;100"])
        .await
        .unwrap();
    assert_eq!(result.skipped_superseded, 1);
    assert_eq!(result.inserted + result.updated, 0);
    assert!(result.warnings[0].message.contains("requisition SC-5 already belongs to PO OC-5"));

    let order = order_by_po(&store, &ctx.tenant_id, "OC-5").await;
    assert_eq!(order.fields.description, "Motor");
    assert_eq!(order.fields.value_total, dec!(900));
    assert_eq!(store.list_orders(&ctx.tenant_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conservative_update_keeps_identification() {
    let (store, ctx) = setup();
    import(&store, &ctx, ImportOptions::default(), &["SC-7;OC-7;;Bomba dagua;2;;;;;500"])
        .await
        .unwrap();

    let options = ImportOptions {
        conservative: true,
        ..Default::default()
    };
    let result = import(&store, &ctx, options, &["SC-99;OC-7;;Bomba renomeada;3;;;;Em Transporte;650"])
        .await
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.value_changed, 1);

    let order = order_by_po(&store, &ctx.tenant_id, "OC-7").await;
    assert_eq!(order.fields.description, "Bomba dagua");
    assert_eq!(order.fields.requisition_number.as_deref(), Some("SC-7"));
    assert_eq!(order.fields.quantity_requested, dec!(3));
    assert_eq!(order.fields.status, OrderStatus::InTransit);
    assert_eq!(order.fields.value_total, dec!(650));
}

#[tokio::test]
async fn test_skip_existing_mode() {
    let (store, ctx) = setup();
    import(&store, &ctx, ImportOptions::default(), &[";OC-8;;Fita;1;;;;;5"])
        .await
        .unwrap();

    let options = ImportOptions {
        skip_existing: true,
        ..Default::default()
    };
    let result = import(&store, &ctx, options, &[";OC-8;;Fita;1;;;;;7", ";OC-9;;Cola;1;;;;;3"])
        .await
        .unwrap();
    assert_eq!(result.skipped_duplicate, 1);
    assert_eq!(result.inserted, 1);
    assert_eq!(order_by_po(&store, &ctx.tenant_id, "OC-8").await.fields.value_total, dec!(5));
}

#[tokio::test]
async fn test_invalid_batch_writes_nothing() {
    let (store, ctx) = setup();
    let err = import(
        &store,
        &ctx,
        ImportOptions::default(),
        &[";OC-1;;Luva;1;;;;;10", ";OC-2;;;0;;;31/02/2024;;10", ";OC-3;;Bota;2;;;;Perdido;x"],
    )
    .await
    .unwrap_err();

    let ImportError::Validation(report) = err else {
        panic!("expected validation error");
    };
    assert_eq!(report.invalid_lines(), vec![3, 4]);
    assert!(report.errors.iter().any(|e| e.line == 3 && e.message == "invalid date in column data_solicitacao"));
    assert!(report.errors.iter().any(|e| e.line == 4 && e.message == "invalid number in column valor_total"));
    assert!(store.list_orders(&ctx.tenant_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_key_in_batch_creates_one_order() {
    let (store, ctx) = setup();
    let result = import(
        &store,
        &ctx,
        ImportOptions::default(),
        &[";OC-20;;Tinta;4;;;;;40", ";OC-20;;Tinta;4;;;;;44", "SC-30;;;Pincel;1;;;;;2", "SC-30;;;Pincel;2;;;;;2"],
    )
    .await
    .unwrap();
    assert_eq!(result.inserted, 2);
    assert_eq!(result.updated, 0);
    assert_eq!(result.skipped_duplicate, 2);
    assert_eq!(store.list_orders(&ctx.tenant_id).await.unwrap().len(), 2);

    let order = order_by_po(&store, &ctx.tenant_id, "OC-20").await;
    assert_eq!(order.fields.value_total, dec!(44));
    assert_eq!(store.audit_trail(&ctx.tenant_id, &order.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_batch_with_repeated_key_reimports_without_changes() {
    let (store, ctx) = setup();
    let lines = [";OC-1;;Filtro;10;;;;;100", ";OC-1;;Filtro;10;;;;;150"];

    let first = import(&store, &ctx, ImportOptions::default(), &lines).await.unwrap();
    assert_eq!(first.inserted, 1);
    let order = order_by_po(&store, &ctx.tenant_id, "OC-1").await;
    assert_eq!(order.fields.value_total, dec!(150));
    let audit_before = store.audit_trail(&ctx.tenant_id, &order.id).await.unwrap().len();

    let second = import(&store, &ctx, ImportOptions::default(), &lines).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.value_changed, 0);
    assert_eq!(second.skipped_duplicate, 1);

    assert_eq!(order_by_po(&store, &ctx.tenant_id, "OC-1").await, order);
    let audit_after = store.audit_trail(&ctx.tenant_id, &order.id).await.unwrap().len();
    assert_eq!(audit_after, audit_before);
}

#[tokio::test]
async fn test_imported_delivered_status_closes_order() {
    let (store, ctx) = setup();
    let result = import(&store, &ctx, ImportOptions::default(), &[";OC-40;;Disjuntor;4;;;;Entregue;120"])
        .await
        .unwrap();
    assert_eq!(result.inserted, 1);

    let order = order_by_po(&store, &ctx.tenant_id, "OC-40").await;
    assert_eq!(order.fields.status, OrderStatus::Delivered);
    assert_eq!(order.fields.quantity_delivered, dec!(4));
    assert_eq!(order.quantity_pending(), dec!(0));
    assert!(order.fields.actual_delivery_date.is_some());
}

#[tokio::test]
async fn test_status_without_po_is_rejected_per_row() {
    let (store, ctx) = setup();
    let result = import(
        &store,
        &ctx,
        ImportOptions::default(),
        &["SC-50;;;Relé;1;;;;Em Transporte;10", "SC-51;;;Fusível;1;;;;;10"],
    )
    .await
    .unwrap();
    assert_eq!(result.rejected, 1);
    assert_eq!(result.inserted, 1);
    assert_eq!(result.row_errors[0].line, 2);
    assert!(result.row_errors[0].message.contains("requires a PO number"));
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let (store, acme) = setup();
    let globex = RuntimeContext::new("globex", "importador");
    import(&store, &acme, ImportOptions::default(), &[";OC-1;;Luva;1;;;;;10"])
        .await
        .unwrap();
    let result = import(&store, &globex, ImportOptions::default(), &[";OC-1;;Luva;1;;;;;99"])
        .await
        .unwrap();
    assert_eq!(result.inserted, 1);
    assert_eq!(order_by_po(&store, &acme.tenant_id, "OC-1").await.fields.value_total, dec!(10));
    assert_eq!(order_by_po(&store, &globex.tenant_id, "OC-1").await.fields.value_total, dec!(99));
}
