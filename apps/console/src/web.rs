use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use heatpump_core::{
    BackendError, CircuitState, ConfirmationChoice, ControlError, ControllerSnapshot, ScheduleError,
    ScheduleVariable, Session, TelemetrySample, ToggleOutcome, VariableSchedule, MAX_COVERAGE_DAYS,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Builds a fresh session for an operator token.
pub type Connector = Arc<dyn Fn(Option<String>) -> anyhow::Result<Arc<Session>> + Send + Sync>;

// Shared state between the live session and the web handlers
#[derive(Clone)]
pub struct WebState {
    pub session: Arc<RwLock<Arc<Session>>>,
    pub connect: Connector,
    pub poll_interval: Duration,
    pub static_dir: Option<PathBuf>,
}

impl WebState {
    async fn current(&self) -> Arc<Session> {
        self.session.read().await.clone()
    }
}

#[derive(Debug)]
pub enum ApiError {
    SessionExpired,
    Unavailable(String),
    BadRequest(String),
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, reauthenticate) = match self {
            ApiError::SessionExpired => (StatusCode::UNAUTHORIZED, "session expired".to_string(), true),
            ApiError::Unavailable(m) => (StatusCode::BAD_GATEWAY, m, false),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, false),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m, false),
        };
        let body = serde_json::json!({
            "success": false,
            "error": message,
            "reauthenticate": reauthenticate,
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unauthorized => ApiError::SessionExpired,
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::Backend(b) => b.into(),
            other => ApiError::Conflict(other.to_string()),
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::Backend(b) => b.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

/// Maps a session operation's error; an expired session is torn down on the way out.
async fn settle<T, E: Into<ApiError>>(session: &Session, result: Result<T, E>) -> Result<T, ApiError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let err = e.into();
            match &err {
                ApiError::SessionExpired => {
                    warn!("backend session expired, operator must log in again");
                    session.end().await;
                }
                other => warn!("request failed: {:?}", other),
            }
            Err(err)
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryView {
    coverage_days: u32,
    samples: Vec<TelemetrySample>,
}

#[derive(Deserialize)]
pub struct CoverageRequest {
    days: u32,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    accept: bool,
}

#[derive(Deserialize)]
pub struct SchedulingRequest {
    enabled: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    token: String,
}

pub fn router(state: WebState) -> Router {
    let mut app = Router::new()
        .route("/", get(serve_dashboard))
        .route("/api/telemetry", get(get_telemetry))
        .route("/api/telemetry/latest", get(get_latest))
        .route("/api/telemetry/coverage", put(set_coverage))
        .route("/api/heating", get(get_heating))
        .route("/api/heating/toggle", post(toggle_heating))
        .route("/api/heating/confirm", post(confirm_start))
        .route("/api/heating/scheduling", post(set_scheduling))
        .route("/api/schedules/:variable", get(get_schedule).put(put_schedule))
        .route("/api/schedules/:variable/reset", post(reset_schedule))
        .route("/api/session", post(login));

    if let Some(dir) = &state.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn create_web_server(listen: &str, state: WebState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Starting web console on http://{}", listen);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn serve_dashboard(State(state): State<WebState>) -> Html<String> {
    let Some(dir) = &state.static_dir else {
        return Html("Dashboard not installed, see /api/heating".to_string());
    };
    match tokio::fs::read_to_string(dir.join("index.html")).await {
        Ok(content) => Html(content),
        Err(e) => {
            warn!("Error reading index.html: {}", e);
            Html("Error loading page".to_string())
        }
    }
}

async fn telemetry_view(session: &Session) -> TelemetryView {
    TelemetryView {
        coverage_days: session.coverage_days().await,
        samples: session.snapshot().await,
    }
}

async fn get_telemetry(State(state): State<WebState>) -> axum::Json<TelemetryView> {
    let session = state.current().await;
    axum::Json(telemetry_view(&session).await)
}

async fn get_latest(State(state): State<WebState>) -> axum::Json<Option<TelemetrySample>> {
    axum::Json(state.current().await.latest().await)
}

async fn set_coverage(
    State(state): State<WebState>,
    Json(request): Json<CoverageRequest>,
) -> Result<axum::Json<TelemetryView>, ApiError> {
    if !(1..=MAX_COVERAGE_DAYS).contains(&request.days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_COVERAGE_DAYS
        )));
    }
    let session = state.current().await;
    settle(&session, session.reconfigure_coverage(request.days).await).await?;
    Ok(axum::Json(telemetry_view(&session).await))
}

async fn get_heating(State(state): State<WebState>) -> axum::Json<ControllerSnapshot> {
    axum::Json(state.current().await.heating().await)
}

async fn toggle_heating(State(state): State<WebState>) -> Result<axum::Json<ToggleOutcome>, ApiError> {
    let session = state.current().await;
    let outcome = settle(&session, session.toggle().await).await?;
    Ok(axum::Json(outcome))
}

async fn confirm_start(
    State(state): State<WebState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<axum::Json<ToggleOutcome>, ApiError> {
    let choice = if request.accept {
        ConfirmationChoice::Accept
    } else {
        ConfirmationChoice::Decline
    };
    let session = state.current().await;
    let outcome = settle(&session, session.confirm(choice).await).await?;
    Ok(axum::Json(outcome))
}

async fn set_scheduling(
    State(state): State<WebState>,
    Json(request): Json<SchedulingRequest>,
) -> Result<axum::Json<CircuitState>, ApiError> {
    let session = state.current().await;
    let circuit = settle(&session, session.set_scheduling(request.enabled).await).await?;
    Ok(axum::Json(circuit))
}

async fn get_schedule(
    State(state): State<WebState>,
    Path(variable): Path<String>,
) -> Result<axum::Json<VariableSchedule>, ApiError> {
    let variable: ScheduleVariable = variable.parse()?;
    let session = state.current().await;
    if session.schedule_ready(variable).await {
        if let Some(schedule) = session.schedule(variable).await {
            return Ok(axum::Json(schedule));
        }
    }
    let schedule = settle(&session, session.load_schedule(variable).await).await?;
    Ok(axum::Json(schedule))
}

async fn put_schedule(
    State(state): State<WebState>,
    Path(variable): Path<String>,
    Json(schedule): Json<VariableSchedule>,
) -> Result<axum::Json<VariableSchedule>, ApiError> {
    let variable: ScheduleVariable = variable.parse()?;
    let session = state.current().await;
    settle(&session, session.update_schedule(variable, schedule.clone()).await).await?;
    Ok(axum::Json(schedule))
}

async fn reset_schedule(
    State(state): State<WebState>,
    Path(variable): Path<String>,
) -> Result<axum::Json<VariableSchedule>, ApiError> {
    let variable: ScheduleVariable = variable.parse()?;
    let session = state.current().await;
    let schedule = settle(&session, session.reset_schedule(variable).await).await?;
    Ok(axum::Json(schedule))
}

async fn login(
    State(state): State<WebState>,
    Json(request): Json<LoginRequest>,
) -> Result<axum::Json<ControllerSnapshot>, ApiError> {
    let session = (state.connect)(Some(request.token)).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    session.start_live(state.poll_interval).await;
    if let Err(e) = session.bootstrap().await {
        session.end().await;
        return Err(e.into());
    }

    let previous = std::mem::replace(&mut *state.session.write().await, session.clone());
    previous.end().await;
    info!("operator session started");
    Ok(axum::Json(session.heating().await))
}
