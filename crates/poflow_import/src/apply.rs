use chrono::{NaiveDate, Utc};
use poflow_model::{AuditAction, AuditEntry, NewSupplier, Order, OrderFields, OrderId, OrderStatus};
use poflow_runtime::audit::{create_entry, diff_entries};
use poflow_runtime::directory::{resolve_department, resolve_supplier};
use poflow_runtime::workflow::{WorkflowEngine, align_status_with_po, close_out, settle};
use poflow_runtime::{OrderStore, RuntimeContext, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::normalizer::NormalizedRow;
use crate::planner::{ImportPlan, PlanAction, SkipReason, value_differs};
use crate::validator::RowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Restrict updates of existing orders to the conservative field set.
    pub conservative: bool,
    /// Skip rows whose PO already exists instead of updating.
    pub skip_existing: bool,
    /// Progress callback cadence, in rows.
    pub progress_every: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            conservative: false,
            skip_existing: false,
            progress_every: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Inserted,
    Updated,
    Unchanged,
    Skipped,
    Rejected,
    Error,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::Inserted => "inserted",
            RowAction::Updated => "updated",
            RowAction::Unchanged => "unchanged",
            RowAction::Skipped => "skipped",
            RowAction::Rejected => "rejected",
            RowAction::Error => "error",
        }
    }
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowLogEntry {
    pub line: usize,
    pub action: RowAction,
    pub key: Option<String>,
    pub order_id: Option<OrderId>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub processed: usize,
    pub inserted: usize,
    /// Includes `unchanged`.
    pub updated: usize,
    pub unchanged: usize,
    pub value_changed: usize,
    pub errors: usize,
    pub rejected: usize,
    pub skipped_duplicate: usize,
    pub skipped_superseded: usize,
    pub cancelled: bool,
    /// Skips and best-effort fallbacks; not failures.
    pub warnings: Vec<RowError>,
    pub row_errors: Vec<RowError>,
    pub log: Vec<RowLogEntry>,
}

/// Receives per-row outcomes while a batch is applied.
pub trait ApplyObserver: Send + Sync {
    fn on_row(&self, _entry: &RowLogEntry) {}
    fn on_progress(&self, _done: usize, _total: usize) {}
}

pub struct NoopObserver;

impl ApplyObserver for NoopObserver {}

/// How one row ended up, before it is folded into the counters.
enum RowOutcome {
    Inserted(Order),
    Updated { order: Order, value_changed: bool },
    Unchanged(Order),
}

enum RowFailure {
    Rejected(String),
    Error(String),
}

impl From<StoreError> for RowFailure {
    fn from(e: StoreError) -> Self {
        RowFailure::Error(e.to_string())
    }
}

pub struct ApplyEngine {
    store: Arc<dyn OrderStore>,
    options: ImportOptions,
    workflow: WorkflowEngine,
}

impl ApplyEngine {
    pub fn new(store: Arc<dyn OrderStore>, options: ImportOptions) -> Self {
        Self {
            store,
            options,
            workflow: WorkflowEngine::new(),
        }
    }

    /// Applies the plan row by row. A failing row is recorded and the next
    /// row proceeds; cancellation stops between rows.
    pub async fn apply(
        &self,
        ctx: &RuntimeContext,
        plan: ImportPlan,
        observer: &dyn ApplyObserver,
        cancel: &CancellationToken,
    ) -> ImportResult {
        let total = plan.rows.len();
        let every = self.options.progress_every.max(1);
        let today = Utc::now().date_naive();
        let mut result = ImportResult::default();

        info!(
            tenant = %ctx.tenant_id,
            rows = total,
            conservative = self.options.conservative,
            skip_existing = self.options.skip_existing,
            "applying import batch"
        );

        for planned in plan.rows {
            if cancel.is_cancelled() {
                warn!(tenant = %ctx.tenant_id, done = result.processed, total, "import cancelled");
                result.cancelled = true;
                break;
            }

            let row = planned.row;
            let key = row.key().map(str::to_string);
            let line = row.line;
            result.processed += 1;

            let outcome = match planned.action {
                PlanAction::Skip { reason, detail } => {
                    match reason {
                        SkipReason::Duplicate | SkipReason::Merged => result.skipped_duplicate += 1,
                        SkipReason::Superseded => result.skipped_superseded += 1,
                    }
                    warn!(line, reason = ?reason, "{}", detail);
                    result.warnings.push(RowError::new(line, format!("skipped: {}", detail)));
                    self.log(&mut result, observer, line, RowAction::Skipped, key, None, detail);
                    self.progress(&result, observer, total, every);
                    continue;
                }
                PlanAction::Insert => self.insert_row(ctx, &row, today, &mut result.warnings).await,
                PlanAction::Update { id, .. } => self.update_row(ctx, &id, &row, today, &mut result.warnings).await,
            };

            match outcome {
                Ok(RowOutcome::Inserted(order)) => {
                    result.inserted += 1;
                    let message = format!("created with status {}", order.fields.status);
                    self.log(&mut result, observer, line, RowAction::Inserted, key, Some(order.id), message);
                }
                Ok(RowOutcome::Updated { order, value_changed }) => {
                    result.updated += 1;
                    if value_changed {
                        result.value_changed += 1;
                    }
                    let message = if value_changed {
                        format!("updated; value_total now {}", order.fields.value_total.normalize())
                    } else {
                        "updated".to_string()
                    };
                    self.log(&mut result, observer, line, RowAction::Updated, key, Some(order.id), message);
                }
                Ok(RowOutcome::Unchanged(order)) => {
                    result.updated += 1;
                    result.unchanged += 1;
                    self.log(
                        &mut result,
                        observer,
                        line,
                        RowAction::Unchanged,
                        key,
                        Some(order.id),
                        "no changes".to_string(),
                    );
                }
                Err(RowFailure::Rejected(message)) => {
                    result.rejected += 1;
                    warn!(line, "{}", message);
                    result.row_errors.push(RowError::new(line, message.clone()));
                    self.log(&mut result, observer, line, RowAction::Rejected, key, None, message);
                }
                Err(RowFailure::Error(message)) => {
                    result.errors += 1;
                    error!(line, "{}", message);
                    result.row_errors.push(RowError::new(line, message.clone()));
                    self.log(&mut result, observer, line, RowAction::Error, key, None, message);
                }
            }
            self.progress(&result, observer, total, every);
        }

        if result.processed % every != 0 || total == 0 {
            observer.on_progress(result.processed, total);
        }

        info!(
            tenant = %ctx.tenant_id,
            processed = result.processed,
            inserted = result.inserted,
            updated = result.updated,
            unchanged = result.unchanged,
            value_changed = result.value_changed,
            rejected = result.rejected,
            errors = result.errors,
            skipped_duplicate = result.skipped_duplicate,
            skipped_superseded = result.skipped_superseded,
            cancelled = result.cancelled,
            "import batch finished"
        );
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn log(
        &self,
        result: &mut ImportResult,
        observer: &dyn ApplyObserver,
        line: usize,
        action: RowAction,
        key: Option<String>,
        order_id: Option<OrderId>,
        message: String,
    ) {
        let entry = RowLogEntry {
            line,
            action,
            key,
            order_id,
            message,
        };
        observer.on_row(&entry);
        result.log.push(entry);
    }

    fn progress(&self, result: &ImportResult, observer: &dyn ApplyObserver, total: usize, every: usize) {
        if result.processed % every == 0 {
            observer.on_progress(result.processed, total);
        }
    }

    async fn insert_row(
        &self,
        ctx: &RuntimeContext,
        row: &NormalizedRow,
        today: NaiveDate,
        warnings: &mut Vec<RowError>,
    ) -> Result<RowOutcome, RowFailure> {
        let mut fields = new_fields(row);
        align_status_with_po(&mut fields);
        if fields.status == OrderStatus::Delivered {
            close_out(&mut fields, today);
        }
        self.workflow
            .validate(None, &fields)
            .map_err(|v| RowFailure::Rejected(v.to_string()))?;

        self.attach_department(ctx, row, &mut fields, warnings).await;
        self.attach_supplier(ctx, row, &mut fields, warnings).await;

        let order = self.store.insert_order(&ctx.tenant_id, fields).await?;
        let reason = format!("import line {}", row.line);
        self.write_audit(&[create_entry(ctx, &order.id, Some(&reason))], row.line, warnings)
            .await;

        debug!(line = row.line, order = %order.id, "row inserted");
        Ok(RowOutcome::Inserted(order))
    }

    async fn update_row(
        &self,
        ctx: &RuntimeContext,
        id: &OrderId,
        row: &NormalizedRow,
        today: NaiveDate,
        warnings: &mut Vec<RowError>,
    ) -> Result<RowOutcome, RowFailure> {
        let before = self
            .store
            .get_order(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| RowFailure::Error(format!("order {} no longer exists", id)))?;

        let mut after = before.fields.clone();
        merge_row(row, &mut after, self.options.conservative);
        align_status_with_po(&mut after);
        if row.status == Some(OrderStatus::Delivered) {
            close_out(&mut after, today);
        }
        settle(&mut after, today);
        self.workflow
            .validate(Some(&before.fields), &after)
            .map_err(|v| RowFailure::Rejected(v.to_string()))?;

        if row
            .department
            .as_deref()
            .is_some_and(|d| !before.fields.department.as_deref().is_some_and(|b| b.eq_ignore_ascii_case(d)))
        {
            self.attach_department(ctx, row, &mut after, warnings).await;
        }
        if row.supplier_code.is_some() {
            self.attach_supplier(ctx, row, &mut after, warnings).await;
        }

        if before.fields.changed_fields(&after).is_empty() {
            debug!(line = row.line, order = %id, "row matches stored order");
            return Ok(RowOutcome::Unchanged(before));
        }

        let value_changed = value_differs(before.fields.value_total, after.value_total);
        let updated = self
            .store
            .update_order(&ctx.tenant_id, id, before.version, after)
            .await?;

        let reason = format!("import line {}", row.line);
        let entries = diff_entries(
            ctx,
            id,
            &before.fields,
            &updated.fields,
            AuditAction::Edit,
            Some(&reason),
        );
        self.write_audit(&entries, row.line, warnings).await;

        debug!(line = row.line, order = %id, fields = entries.len(), "row updated");
        Ok(RowOutcome::Updated {
            order: updated,
            value_changed,
        })
    }

    /// The order write already happened; a lost audit write is reported, not undone.
    async fn write_audit(&self, entries: &[AuditEntry], line: usize, warnings: &mut Vec<RowError>) {
        if let Err(e) = self.store.append_audit(entries).await {
            error!(line, error = %e, "audit entries not written");
            warnings.push(RowError::new(line, format!("audit not recorded: {}", e)));
        }
    }

    async fn attach_department(
        &self,
        ctx: &RuntimeContext,
        row: &NormalizedRow,
        fields: &mut OrderFields,
        warnings: &mut Vec<RowError>,
    ) {
        let Some(name) = row.department.as_deref() else { return };
        fields.department = Some(name.to_string());
        match resolve_department(self.store.as_ref(), &ctx.tenant_id, name).await {
            Some(department) => {
                fields.department = Some(department.name);
                fields.department_id = Some(department.id);
            }
            None => {
                fields.department_id = None;
                warnings.push(RowError::new(
                    row.line,
                    format!("department '{}' kept as plain text", name),
                ));
            }
        }
    }

    async fn attach_supplier(
        &self,
        ctx: &RuntimeContext,
        row: &NormalizedRow,
        fields: &mut OrderFields,
        warnings: &mut Vec<RowError>,
    ) {
        let Some(code) = row.supplier_code else { return };
        let template = NewSupplier {
            code,
            name: row.supplier_name.clone(),
            city: row.supplier_city.clone(),
            state: row.supplier_state.clone(),
        };
        match resolve_supplier(self.store.as_ref(), &ctx.tenant_id, template).await {
            Some(supplier) => fields.supplier_id = Some(supplier.id),
            None => warnings.push(RowError::new(row.line, format!("supplier {} not linked", code))),
        }
    }
}

/// Fields of a brand-new order. A missing status is derived from the PO number.
fn new_fields(row: &NormalizedRow) -> OrderFields {
    let status = row.status.unwrap_or(if row.purchase_order_number.is_some() {
        OrderStatus::HasPo
    } else {
        OrderStatus::NoPo
    });
    OrderFields {
        requisition_number: row.requisition_number.clone(),
        purchase_order_number: row.purchase_order_number.clone(),
        description: row.description.clone().unwrap_or_default(),
        department: row.department.clone(),
        department_id: None,
        equipment_code: row.equipment_code.clone(),
        material_code: row.material_code.clone(),
        supplier_id: None,
        quantity_requested: row.quantity_requested.unwrap_or_default(),
        quantity_delivered: Decimal::ZERO,
        status,
        requested_date: row.requested_date,
        po_date: row.po_date,
        expected_delivery_date: row.expected_delivery_date,
        actual_delivery_date: None,
        unit_price: row.unit_price,
        last_purchase_price: row.last_purchase_price,
        value_total: row.value_total.unwrap_or_default(),
    }
}

/// Copies the values a row supplies onto a stored order. Absent values never
/// clear stored ones; conservative runs leave identification and pricing alone.
fn merge_row(row: &NormalizedRow, fields: &mut OrderFields, conservative: bool) {
    if let Some(status) = row.status {
        fields.status = status;
    }
    if row.requested_date.is_some() {
        fields.requested_date = row.requested_date;
    }
    if row.po_date.is_some() {
        fields.po_date = row.po_date;
    }
    if row.expected_delivery_date.is_some() {
        fields.expected_delivery_date = row.expected_delivery_date;
    }
    if let Some(q) = row.quantity_requested {
        fields.quantity_requested = q;
    }
    if let Some(total) = row.value_total {
        fields.value_total = total;
    }

    if conservative {
        return;
    }

    if let Some(description) = &row.description {
        fields.description = description.clone();
    }
    if row.requisition_number.is_some() {
        fields.requisition_number = row.requisition_number.clone();
    }
    if row.equipment_code.is_some() {
        fields.equipment_code = row.equipment_code.clone();
    }
    if row.material_code.is_some() {
        fields.material_code = row.material_code.clone();
    }
    if row.unit_price.is_some() {
        fields.unit_price = row.unit_price;
    }
    if row.last_purchase_price.is_some() {
        fields.last_purchase_price = row.last_purchase_price;
    }
}
