use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::submit::{submit_strict, submit_typed};
use crate::error::PoiError;
use crate::models::Horizon;
use crate::predictions::{PollOutcome, PredictionPoller, PredictionStore, StrategyNote};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PredictionStore>,
    pub poller: Arc<PredictionPoller>,
}

impl AppState {
    pub fn new(poller: Arc<PredictionPoller>) -> Self {
        Self {
            store: poller.store().clone(),
            poller,
        }
    }
}

/// Create the API router.
///
/// The strict `/submit` contract only exists for 7-period deployments.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/predictions", get(list_predictions).post(submit_typed))
        .route("/api/predictions/latest", get(latest_prediction))
        .route(
            "/api/predictions/latest/strategy",
            post(attach_latest_strategy),
        )
        .route("/api/predictions/:id", get(get_prediction))
        .route("/api/predictions/:id/strategy", post(attach_strategy));

    if state.store.horizon() == Horizon::Seven {
        router = router.route("/submit", post(submit_strict));
    }

    router.with_state(state)
}

// ===== Route Handlers =====

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        horizon: state.store.horizon().len(),
        predictions: state.store.len(),
    })
}

/// Poll every submission and return them with their status.
async fn list_predictions(State(state): State<AppState>) -> Json<PredictionsResponse> {
    let predictions = state.poller.poll_all().await;
    Json(PredictionsResponse {
        count: predictions.len(),
        pending: predictions
            .iter()
            .filter(|p| !p.status.is_finalized())
            .count(),
        predictions,
    })
}

async fn get_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PollOutcome>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.poller.poll(id).await?))
}

async fn latest_prediction(
    State(state): State<AppState>,
    Query(params): Query<LatestQuery>,
) -> Result<Json<LatestResponse>, ApiError> {
    let username = required_username(params.username)?;
    let id = latest_for(&state, &username)?;
    Ok(Json(LatestResponse {
        username,
        prediction_id: id,
    }))
}

async fn attach_strategy(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StrategyNote>, JsonRejection>,
) -> Result<Json<StrategyResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(note) = body?;
    state.store.attach_strategy(id, note)?;
    Ok(Json(StrategyResponse::success(id)))
}

async fn attach_latest_strategy(
    State(state): State<AppState>,
    body: Result<Json<LatestStrategyRequest>, JsonRejection>,
) -> Result<Json<StrategyResponse>, ApiError> {
    let Json(request) = body?;
    let username = required_username(request.username)?;
    let id = latest_for(&state, &username)?;
    state.store.attach_strategy(id, request.note)?;
    Ok(Json(StrategyResponse::success(id)))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid prediction id: {}", raw)))
}

fn required_username(username: Option<String>) -> Result<String, ApiError> {
    username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("username is required".to_string()))
}

fn latest_for(state: &AppState, username: &str) -> Result<Uuid, ApiError> {
    state
        .store
        .find_latest_by_user(username)
        .ok_or_else(|| ApiError::NotFound(format!("no predictions for user {}", username)))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct LatestQuery {
    username: Option<String>,
}

#[derive(Deserialize)]
struct LatestStrategyRequest {
    username: Option<String>,
    #[serde(flatten)]
    note: StrategyNote,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    horizon: usize,
    predictions: usize,
}

#[derive(Serialize)]
struct PredictionsResponse {
    count: usize,
    pending: usize,
    predictions: Vec<PollOutcome>,
}

#[derive(Serialize)]
struct LatestResponse {
    username: String,
    prediction_id: Uuid,
}

#[derive(Serialize)]
struct StrategyResponse {
    status: &'static str,
    prediction_id: Uuid,
}

impl StrategyResponse {
    fn success(prediction_id: Uuid) -> Self {
        Self {
            status: "success",
            prediction_id,
        }
    }
}

// ===== Error Handling =====

#[derive(Debug)]
pub(crate) enum ApiError {
    Domain(PoiError),
    NotFound(String),
    BadRequest(String),
    Body(JsonRejection),
}

impl From<PoiError> for ApiError {
    fn from(err: PoiError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection)
    }
}

fn domain_status(err: &PoiError) -> StatusCode {
    match err {
        PoiError::Validation(_) => StatusCode::BAD_REQUEST,
        PoiError::NotFound(_) => StatusCode::NOT_FOUND,
        PoiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PoiError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PoiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Domain(err) => {
                let status = domain_status(err);
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), "API error: {}", err);
                }
                (status, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Body(rejection) => (rejection.status(), rejection.body_text()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
