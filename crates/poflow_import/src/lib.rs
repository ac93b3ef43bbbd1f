pub mod apply;
pub mod normalizer;
pub mod planner;
pub mod report;
pub mod resolver;
pub mod source;
pub mod validator;

pub use apply::{ApplyEngine, ApplyObserver, ImportOptions, ImportResult, NoopObserver, RowAction, RowLogEntry};
pub use normalizer::{NormalizedRow, normalize};
pub use planner::{ImportPlan, PlanAction, PlanSummary, SkipReason};
pub use source::{RawBatch, RawRow, RawValue, SourceError};
pub use validator::{RowError, ValidationReport};

use poflow_runtime::{OrderStore, RuntimeContext, StoreError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The batch was rejected before any write.
    #[error("batch rejected: {0}")]
    Validation(ValidationReport),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Normalize, validate, resolve, plan and apply, in that order.
pub struct Importer {
    store: Arc<dyn OrderStore>,
    options: ImportOptions,
}

impl Importer {
    pub fn new(store: Arc<dyn OrderStore>, options: ImportOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Normalizes every row and validates the batch as a whole. One bad row
    /// rejects the batch.
    pub fn prepare(&self, batch: &RawBatch) -> Result<Vec<NormalizedRow>, ImportError> {
        let rows: Vec<NormalizedRow> = batch.rows.iter().map(normalize).collect();
        let report = validator::validate_batch(&rows);
        if !report.is_valid() {
            warn!(errors = report.errors.len(), rows = rows.len(), "import batch failed validation");
            return Err(ImportError::Validation(report));
        }
        Ok(rows)
    }

    /// Everything up to the plan; nothing is written.
    pub async fn preview(&self, ctx: &RuntimeContext, batch: &RawBatch) -> Result<ImportPlan, ImportError> {
        let rows = self.prepare(batch)?;
        let index = resolver::resolve_keys(self.store.as_ref(), &ctx.tenant_id, &rows).await?;
        let plan = planner::plan(rows, &index, self.options.skip_existing);
        info!(
            tenant = %ctx.tenant_id,
            to_insert = plan.summary.to_insert,
            to_update = plan.summary.to_update,
            to_skip = plan.summary.to_skip,
            value_will_change = plan.summary.value_will_change,
            "import plan ready"
        );
        Ok(plan)
    }

    pub async fn run(
        &self,
        ctx: &RuntimeContext,
        batch: &RawBatch,
        observer: &dyn ApplyObserver,
        cancel: &CancellationToken,
    ) -> Result<ImportResult, ImportError> {
        let plan = self.preview(ctx, batch).await?;
        let engine = ApplyEngine::new(self.store.clone(), self.options);
        Ok(engine.apply(ctx, plan, observer, cancel).await)
    }

    pub async fn run_path(&self, ctx: &RuntimeContext, path: &Path) -> Result<ImportResult, ImportError> {
        let batch = source::read_path(path)?;
        self.run(ctx, &batch, &NoopObserver, &CancellationToken::new()).await
    }
}
