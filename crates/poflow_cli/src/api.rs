//! HTTP surface of `poflow serve`.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use poflow_import::source::read_bytes;
use poflow_import::{ImportError, ImportOptions, Importer, NoopObserver, SourceError, ValidationReport};
use poflow_model::{AuditEntry, DeliveryRecord, InvariantViolation, Order, OrderFields, OrderId, OrderStatus};
use poflow_runtime::{
    DeliveryLedger, DeliveryOutcome, OrderEdit, OrderService, OrderStore, RuntimeContext, RuntimeError, StoreError,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn OrderStore>,
    orders: Arc<OrderService>,
    ledger: Arc<DeliveryLedger>,
}

impl AppState {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            orders: Arc::new(OrderService::new(store.clone())),
            ledger: Arc::new(DeliveryLedger::new(store.clone())),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/imports", post(import_file))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order).patch(edit_order))
        .route("/api/orders/{id}/deliveries", post(register_delivery).get(delivery_history))
        .route("/api/orders/{id}/audit", get(audit_trail))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Invariant(InvariantViolation),
    #[error("batch rejected: {0}")]
    BatchRejected(ValidationReport),
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::VersionConflict { .. } | StoreError::UniqueViolation(_) => ApiError::Conflict(e.to_string()),
            StoreError::Database(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::ValidationError(message) => ApiError::BadRequest(message),
            RuntimeError::InvariantViolation(violation) => ApiError::Invariant(violation),
            RuntimeError::OrderNotFound(_) => ApiError::NotFound(e.to_string()),
            RuntimeError::DataStoreError(store) => store.into(),
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Source(source) => source.into(),
            ImportError::Validation(report) => ApiError::BatchRejected(report),
            ImportError::Store(store) => store.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, json!({ "error": message })),
            ApiError::Invariant(violation) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "invariant": violation.invariant }),
            ),
            ApiError::BatchRejected(report) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "errors": report.errors }),
            ),
            ApiError::Internal(_) => {
                error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Caller identity taken from the request headers.
pub struct Actor(pub RuntimeContext);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let tenant = header(TENANT_HEADER)
            .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", TENANT_HEADER)))?;
        let actor = header(ACTOR_HEADER).unwrap_or_else(|| "api".to_string());

        let mut ctx = RuntimeContext::new(tenant, actor);
        if let Some(email) = header(ACTOR_EMAIL_HEADER) {
            ctx = ctx.with_email(email);
        }
        Ok(Actor(ctx))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportFlags {
    pub dry_run: bool,
    pub conservative: bool,
    pub skip_existing: bool,
}

async fn import_file(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Query(flags): Query<ImportFlags>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else { continue };
        let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest("no file in upload".to_string()))?;

    let batch = read_bytes(&file_name, &bytes)?;
    let importer = Importer::new(
        state.store.clone(),
        ImportOptions {
            conservative: flags.conservative,
            skip_existing: flags.skip_existing,
            ..Default::default()
        },
    );

    if flags.dry_run {
        let plan = importer.preview(&ctx, &batch).await?;
        return Ok(Json(plan).into_response());
    }

    let result = importer
        .run(&ctx, &batch, &NoopObserver, &CancellationToken::new())
        .await?;
    Ok(Json(result).into_response())
}

async fn list_orders(State(state): State<AppState>, Actor(ctx): Actor) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_orders(&ctx).await?))
}

/// Body of `POST /api/orders`.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub requisition_number: Option<String>,
    pub purchase_order_number: Option<String>,
    pub description: String,
    pub department: Option<String>,
    pub equipment_code: Option<String>,
    pub material_code: Option<String>,
    pub supplier_id: Option<String>,
    pub quantity_requested: Decimal,
    pub status: Option<OrderStatus>,
    pub requested_date: Option<NaiveDate>,
    pub po_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub unit_price: Option<Decimal>,
    pub last_purchase_price: Option<Decimal>,
    pub value_total: Option<Decimal>,
    pub reason: Option<String>,
}

impl CreateOrderRequest {
    fn into_parts(self) -> (OrderFields, Option<String>) {
        let fields = OrderFields {
            requisition_number: self.requisition_number,
            purchase_order_number: self.purchase_order_number,
            description: self.description.trim().to_string(),
            department: self.department,
            equipment_code: self.equipment_code,
            material_code: self.material_code,
            supplier_id: self.supplier_id,
            quantity_requested: self.quantity_requested,
            status: self.status.unwrap_or_default(),
            requested_date: self.requested_date,
            po_date: self.po_date,
            expected_delivery_date: self.expected_delivery_date,
            unit_price: self.unit_price,
            last_purchase_price: self.last_purchase_price,
            value_total: self.value_total.unwrap_or_default(),
            ..Default::default()
        };
        (fields, self.reason)
    }
}

async fn create_order(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let (fields, reason) = request.into_parts();
    let order = state.orders.create_order(&ctx, fields, reason.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.get_order(&ctx, &OrderId::from(id)).await?))
}

async fn edit_order(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Json(edit): Json<OrderEdit>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.edit_order(&ctx, &OrderId::from(id), &edit).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeliveryRequest {
    pub quantity: Decimal,
    /// Today when absent.
    pub delivery_date: Option<NaiveDate>,
    pub note: Option<String>,
}

async fn register_delivery(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
    Json(request): Json<DeliveryRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let date = request.delivery_date.unwrap_or_else(|| Utc::now().date_naive());
    let result = state
        .ledger
        .register_delivery(&ctx, &OrderId::from(id), request.quantity, date, request.note.as_deref())
        .await;
    let outcome = DeliveryOutcome::from(&result);
    let receipt = result?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": outcome.message,
            "completed": receipt.completed,
            "delivery": receipt.record,
            "order": receipt.order,
            "warnings": receipt.warnings,
        })),
    ))
}

async fn delivery_history(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryRecord>>, ApiError> {
    Ok(Json(state.orders.delivery_history(&ctx, &OrderId::from(id)).await?))
}

async fn audit_trail(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    Ok(Json(state.orders.audit_trail(&ctx, &OrderId::from(id)).await?))
}
