// Roll Sync - Web Server
// JSON API over the student directory and the reconciliation pass

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use roll_sync::logging::init_tracing;
use roll_sync::{
    AppConfig, Audience, CourseCatalog, DirectoryError, DirectorySummary, ParsedIdentifier,
    ReconciliationEngine, Role, SqliteStore, Status, StudentFilter, StudentRecord, StudentStore,
    SyncError, SyncOutcome,
};

const ENV_ADDR: &str = "ROLL_SYNC_ADDR";
const ENV_CONFIG: &str = "ROLL_SYNC_CONFIG";
const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    engine: Arc<ReconciliationEngine>,
    catalog: Arc<CourseCatalog>,
}

impl AppState {
    fn store(&self) -> MutexGuard<'_, SqliteStore> {
        // Every write is one transaction, so a poisoned lock holds no partial state
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

fn directory_error(err: anyhow::Error) -> Response {
    match err.downcast_ref::<DirectoryError>() {
        Some(DirectoryError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        Some(DirectoryError::AdminProtected { .. }) => {
            error_response(StatusCode::CONFLICT, err.to_string())
        }
        None => {
            error!("directory update failed: {:#}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

#[derive(Serialize)]
struct ClassifyResponse {
    roll_number: String,
    #[serde(flatten)]
    parsed: ParsedIdentifier,
    course_name: Option<String>,
}

#[derive(Serialize)]
struct StudentResponse {
    #[serde(flatten)]
    student: StudentRecord,
    course_name: Option<String>,
    batch: Option<String>,
}

#[derive(Deserialize)]
struct SyncParams {
    #[serde(default)]
    dry_run: bool,
}

/// Comma-separated lists, e.g. `?courses=BCA,MBA&entrance_years=2023`
#[derive(Deserialize)]
struct AudienceParams {
    #[serde(default)]
    courses: String,
    #[serde(default)]
    entrance_years: String,
    #[serde(default)]
    pass_out_years: String,
}

impl AudienceParams {
    fn into_audience(self) -> Result<Audience, String> {
        let courses = split_list(&self.courses).map(str::to_string).collect();
        Ok(Audience::from_parts(
            courses,
            parse_years(&self.entrance_years)?,
            parse_years(&self.pass_out_years)?,
        ))
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_years(raw: &str) -> Result<Vec<i32>, String> {
    split_list(raw)
        .map(|y| y.parse().map_err(|_| format!("invalid year: {:?}", y)))
        .collect()
}

#[derive(Serialize)]
struct AudienceResponse {
    audience: Audience,
    count: usize,
    recipients: Vec<StudentRecord>,
}

#[derive(Deserialize)]
struct RoleRequest {
    role: Role,
}

#[derive(Deserialize)]
struct StatusRequest {
    status: Status,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/classify/:roll - Parse a single roll number
async fn classify(State(state): State<AppState>, Path(roll): Path<String>) -> impl IntoResponse {
    let parsed = state.engine.classifier().classify(&roll);
    let course_name = parsed
        .course
        .as_deref()
        .map(|c| state.catalog.display_name(c).to_string());

    Json(ApiResponse::ok(ClassifyResponse {
        roll_number: roll.trim().to_string(),
        parsed,
        course_name,
    }))
}

/// GET /api/students - Filtered student list
async fn list_students(
    State(state): State<AppState>,
    Query(filter): Query<StudentFilter>,
) -> Response {
    let students = match state.store().fetch_all_students() {
        Ok(students) => students,
        Err(e) => {
            error!("Error getting students: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let response: Vec<StudentResponse> = filter
        .apply(&students)
        .into_iter()
        .map(|student| StudentResponse {
            course_name: student
                .course
                .as_deref()
                .map(|c| state.catalog.display_name(c).to_string()),
            batch: student.batch_label(),
            student: student.clone(),
        })
        .collect();

    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

/// GET /api/stats - Directory counts
async fn get_stats(State(state): State<AppState>) -> Response {
    match state.store().fetch_all_students() {
        Ok(students) => {
            let summary = DirectorySummary::from_records(&students);
            (StatusCode::OK, Json(ApiResponse::ok(summary))).into_response()
        }
        Err(e) => {
            error!("Error getting stats: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/audience - Active students an announcement would reach
async fn get_audience(
    State(state): State<AppState>,
    Query(params): Query<AudienceParams>,
) -> Response {
    let audience = match params.into_audience() {
        Ok(audience) => audience,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    match state.store().fetch_all_students() {
        Ok(students) => {
            let recipients: Vec<StudentRecord> =
                audience.resolve(&students).into_iter().cloned().collect();
            let response = AudienceResponse {
                audience,
                count: recipients.len(),
                recipients,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            error!("Error resolving audience: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/students/:id/events - Audit trail
async fn get_events(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = {
        let store = state.store();
        store.get(&id).and_then(|student| match student {
            Some(_) => store.events_for(&id),
            None => Err(DirectoryError::NotFound(id.clone()).into()),
        })
    };

    match result {
        Ok(events) => (StatusCode::OK, Json(ApiResponse::ok(events))).into_response(),
        Err(e) => directory_error(e),
    }
}

/// POST /api/sync?dry_run=true - Run the reconciliation pass
async fn run_sync(State(state): State<AppState>, Query(params): Query<SyncParams>) -> Response {
    let result: Result<SyncOutcome, SyncError> = {
        let mut store = state.store();
        state.engine.sync(&mut *store, params.dry_run)
    };

    match result {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::ok(outcome))).into_response(),
        Err(e @ SyncError::Fetch(_)) => {
            error!("sync aborted: {:#}", anyhow::Error::from(e));
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "failed to read student snapshot".to_string(),
            )
        }
        Err(e @ SyncError::Apply { .. }) => {
            let message = e.to_string();
            error!("sync aborted: {:#}", anyhow::Error::from(e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}

/// POST /api/students/:id/role - Change role
async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Response {
    let result = state.store().set_role(&id, request.role, "api");
    match result {
        Ok(student) => (StatusCode::OK, Json(ApiResponse::ok(student))).into_response(),
        Err(e) => directory_error(e),
    }
}

/// POST /api/students/:id/status - Block, unblock or remove
async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Response {
    let result = state.store().set_status(&id, request.status, "api");
    match result {
        Ok(student) => (StatusCode::OK, Json(ApiResponse::ok(student))).into_response(),
        Err(e) => directory_error(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::var(ENV_CONFIG).ok().map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    let store = SqliteStore::open(&config.database)?;
    info!(database = ?config.database, "database opened");

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        engine: Arc::new(ReconciliationEngine::new(config.classifier()?)),
        catalog: Arc::new(config.course_catalog()?),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/classify/:roll", get(classify))
        .route("/students", get(list_students))
        .route("/students/:id/role", post(set_role))
        .route("/students/:id/status", post(set_status))
        .route("/students/:id/events", get(get_events))
        .route("/audience", get(get_audience))
        .route("/stats", get(get_stats))
        .route("/sync", post(run_sync))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var(ENV_ADDR).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server running on http://{}", addr);
    info!("   API: http://{}/api/students", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
