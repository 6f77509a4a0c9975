//! Submission endpoints.
//!
//! Two contracts coexist:
//! - `POST /submit`: strict, every field checked by hand, exactly 7 predictions.
//! - `POST /api/predictions`: typed body with defaults; length checked against the horizon.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::routes::{ApiError, AppState};
use crate::models::Timeframe;
use crate::predictions::{NewSubmission, StrategyNote};

const STRICT_PREDICTIONS: usize = 7;

/// Body of the strict contract. Everything is optional so missing fields can be
/// reported with one message instead of a deserializer error.
#[derive(Debug, Default, Deserialize)]
pub struct StrictSubmitRequest {
    pub username: Option<String>,
    pub stake: Option<f64>,
    pub predictions: Option<Vec<f64>>,
    pub start_time: Option<String>,
    #[serde(default)]
    pub strategies: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StrictSubmitResponse {
    pub message: &'static str,
    pub prediction_id: Uuid,
}

/// Body of the typed contract.
#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub username: String,
    pub stake: f64,
    pub predictions: Vec<f64>,
    pub start_time: String,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub timeframe: Option<Timeframe>,
    #[serde(default)]
    pub strategies: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub status: &'static str,
    pub prediction_id: Uuid,
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub(crate) async fn submit_strict(
    State(state): State<AppState>,
    body: Result<Json<StrictSubmitRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "strict submit: unreadable body");
            return bad_request("Missing required fields");
        }
    };

    let (Some(username), Some(stake), Some(predictions), Some(start_time)) = (
        request.username,
        request.stake,
        request.predictions,
        request.start_time,
    ) else {
        return bad_request("Missing required fields");
    };

    if predictions.len() != STRICT_PREDICTIONS {
        return bad_request("You must submit exactly 7 predictions.");
    }

    let draft = NewSubmission::new(username, stake, start_time, predictions).with_strategy(
        StrategyNote {
            strategies: request.strategies,
            code: request.code,
            link: request.link,
        },
    );

    match state.store.submit(draft) {
        Ok(prediction_id) => Json(StrictSubmitResponse {
            message: "Prediction submitted successfully",
            prediction_id,
        })
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub(crate) async fn submit_typed(
    State(state): State<AppState>,
    body: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = body?;

    let mut draft = NewSubmission::new(
        request.username,
        request.stake,
        request.start_time,
        request.predictions,
    )
    .with_strategy(StrategyNote {
        strategies: request.strategies,
        code: request.code,
        link: request.link,
    });
    if let Some(pair) = request.pair {
        draft = draft.with_pair(pair);
    }
    if let Some(timeframe) = request.timeframe {
        draft = draft.with_timeframe(timeframe);
    }

    let prediction_id = state.store.submit(draft)?;
    Ok(Json(PredictionResponse {
        status: "success",
        prediction_id,
    }))
}
