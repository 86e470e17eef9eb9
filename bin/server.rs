// RoadEye Ledger - Web Server
// JSON API over the violation/payment ledger with Axum

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Datelike, Local, NaiveDate};
use roadeye_ledger::{
    create_violation_as, dashboard, ensure_schema, get_violation, list_violations,
    open_with_config, payment_summary, record_payment_as, soft_delete_as, violations_report,
    Amount, Dashboard, EntityKind, ErrorKind, Identifier, LedgerConfig, LedgerError, PaymentForm,
    PaymentMethod, PaymentSummary, Receipt, Scope, StatusFilter, ViolationDetail,
    ViolationFilter, ViolationSummary, ViolationsReport,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Names the user a write is made for; set by whatever authenticates requests
const ACTOR_HEADER: &str = "x-roadeye-actor";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    default_actor: Arc<str>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db.lock().map_err(|_| {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Database handle is unavailable")
        })
    }

    /// Actor for the activity log: the request header, else the configured one
    fn actor(&self, headers: &HeaderMap) -> String {
        headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&*self.default_actor)
            .to_string()
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            error: None,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ReferenceNotFound => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::DuplicateKey => StatusCode::CONFLICT,
            ErrorKind::Connectivity => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Allocation
            | ErrorKind::Persistence
            | ErrorKind::Migration
            | ErrorKind::Overflow => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(kind = ?err.kind(), "request failed: {err}");
        }
        // store text stays in the log; the client gets the kind's message
        Self::new(status, err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: serde_json::Value::Null,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn violation_id(raw: &str) -> Result<Identifier, ApiError> {
    Identifier::parse_as(EntityKind::Violation, raw).ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, format!("Violation {raw} was not found"))
    })
}

fn scope_param(resident: Option<&str>) -> Result<Scope, ApiError> {
    match resident.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(Scope::All),
        Some(raw) => Identifier::parse_as(EntityKind::Resident, raw)
            .map(Scope::Resident)
            .ok_or_else(|| ApiError::bad_request(format!("'{raw}' is not a resident ID"))),
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Deserialize)]
struct DashboardParams {
    resident: Option<String>,
    year: Option<i32>,
}

#[derive(Deserialize)]
struct ViolationParams {
    search: Option<String>,
    status: Option<String>,
    resident: Option<String>,
}

#[derive(Deserialize)]
struct SummaryParams {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct NewViolationRequest {
    vehicle_id: String,
    violation_type_id: String,
    date: NaiveDate,
}

#[derive(Serialize)]
struct CreatedViolation {
    violation_id: Identifier,
}

#[derive(Deserialize)]
struct PaymentRequest {
    method: String,
    /// Pesos, e.g. "500" or "1,250.50"
    amount: String,
    payer_name: String,
    contact: String,
    reference: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    violation_id: Identifier,
    deleted: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/dashboard?resident=R001&year=2025
async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> ApiResult<Dashboard> {
    let scope = scope_param(params.resident.as_deref())?;
    let year = params.year.unwrap_or_else(|| Local::now().year());

    let conn = state.conn()?;
    Ok(ApiResponse::ok(dashboard(&conn, &scope, year)?))
}

/// GET /api/violations?search=&status=paid|unpaid&resident=R001
async fn get_violations(
    State(state): State<AppState>,
    Query(params): Query<ViolationParams>,
) -> ApiResult<Vec<ViolationSummary>> {
    let status = match params.status.as_deref() {
        None => StatusFilter::All,
        Some(raw) => StatusFilter::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown status filter '{raw}'")))?,
    };
    let mut filter = ViolationFilter::all()
        .status(status)
        .scope(scope_param(params.resident.as_deref())?);
    if let Some(search) = params.search.as_deref() {
        filter = filter.search(search);
    }

    let conn = state.conn()?;
    Ok(ApiResponse::ok(list_violations(&conn, &filter)?))
}

/// GET /api/violations/:id
async fn get_violation_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ViolationDetail> {
    let id = violation_id(&id)?;
    let conn = state.conn()?;
    Ok(ApiResponse::ok(get_violation(&conn, id)?))
}

/// POST /api/violations
async fn post_violation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewViolationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedViolation>>), ApiError> {
    let vehicle = Identifier::reference(EntityKind::Vehicle, &req.vehicle_id)?;
    let violation_type = Identifier::reference(EntityKind::ViolationType, &req.violation_type_id)?;
    let actor = state.actor(&headers);

    let mut conn = state.conn()?;
    let violation_id = create_violation_as(&mut conn, &actor, vehicle, violation_type, req.date)?;

    Ok((StatusCode::CREATED, ApiResponse::ok(CreatedViolation { violation_id })))
}

/// POST /api/violations/:id/payment
async fn post_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<Receipt> {
    let violation = Identifier::reference(EntityKind::Violation, &id)?;
    let method: PaymentMethod = req.method.parse().map_err(ApiError::bad_request)?;
    let amount = Amount::parse(&req.amount)
        .ok_or_else(|| ApiError::bad_request(format!("invalid amount '{}'", req.amount)))?;

    let form = PaymentForm {
        method,
        amount,
        payer_name: req.payer_name,
        contact: req.contact,
        reference: req.reference,
    };

    let actor = state.actor(&headers);
    let mut conn = state.conn()?;
    Ok(ApiResponse::ok(record_payment_as(&mut conn, &actor, violation, &form)?))
}

/// DELETE /api/violations/:id
async fn delete_violation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<DeleteResponse> {
    let id = violation_id(&id)?;
    let actor = state.actor(&headers);
    let mut conn = state.conn()?;
    let deleted = soft_delete_as(&mut conn, &actor, id)?;

    Ok(ApiResponse::ok(DeleteResponse {
        violation_id: id,
        deleted,
    }))
}

/// GET /api/report - Violations report with totals
async fn get_report(State(state): State<AppState>) -> ApiResult<ViolationsReport> {
    let conn = state.conn()?;
    Ok(ApiResponse::ok(violations_report(&conn)?))
}

/// GET /api/payments/summary?limit=10
async fn get_payment_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> ApiResult<PaymentSummary> {
    let conn = state.conn()?;
    Ok(ApiResponse::ok(payment_summary(&conn, params.limit.unwrap_or(10))?))
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/violations", get(get_violations).post(post_violation))
        .route("/violations/:id", get(get_violation_detail).delete(delete_violation))
        .route("/violations/:id/payment", post(post_payment))
        .route("/report", get(get_report))
        .route("/payments/summary", get(get_payment_summary))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = LedgerConfig::from_env()?;
    let mut conn = open_with_config(&config)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    ensure_schema(&mut conn).context("schema migration failed")?;
    info!(path = %config.database_path.display(), "database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        default_actor: Arc::from(config.actor.as_str()),
    };

    let app = Router::new().nest("/api", api_routes(state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "RoadEye API listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
