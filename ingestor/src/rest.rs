use crate::errors::Error;
use crate::history::HistoryService;
use crate::model::{
    ErrorBody, HistoryParams, Reading, RecentParams, SaveMeasurementRequest, SaveReadingRequest,
};
use crate::mqtt::ConnectionState;
use crate::normalize::{normalize_measurement, normalize_request};
use crate::store::ReadingStore;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn ReadingStore>,
    history: HistoryService,
    mqtt_state: watch::Receiver<ConnectionState>,
}

pub fn create_router(
    store: Arc<dyn ReadingStore>,
    history: HistoryService,
    mqtt_state: watch::Receiver<ConnectionState>,
) -> Router {
    let state = AppState {
        store,
        history,
        mqtt_state,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/sensors", post(save_measurement))
        .route("/api/sensors/save", post(save_reading))
        .route("/api/sensors/history/:device_id", get(get_history))
        .route("/api/sensors/:device_id/recent", get(get_recent))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mqtt = *state.mqtt_state.borrow();
    Json(json!({ "status": "ok", "mqtt": mqtt.as_str() }))
}

async fn save_reading(
    State(state): State<AppState>,
    Json(request): Json<SaveReadingRequest>,
) -> Result<(StatusCode, Json<Reading>), AppError> {
    let reading = normalize_request(request)?;
    state.store.write(&reading).await?;

    info!(
        device_id = %reading.device_id,
        metric_kind = %reading.metric_kind,
        "Saved {} for {}: {}",
        reading.metric_kind, reading.device_id, reading.value
    );
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn save_measurement(
    State(state): State<AppState>,
    Json(request): Json<SaveMeasurementRequest>,
) -> Result<(StatusCode, Json<Vec<Reading>>), AppError> {
    let readings = normalize_measurement(request)?;
    for reading in &readings {
        state.store.write(reading).await?;
    }

    info!(device_id = %readings[0].device_id, "Saved measurement");
    Ok((StatusCode::CREATED, Json(readings.to_vec())))
}

async fn get_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let readings = state
        .history
        .history(&device_id, params.since.as_deref(), params.limit)
        .await?;
    Ok(Json(readings))
}

async fn get_recent(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let readings = state.history.recent(&device_id, params.limit).await?;
    Ok(Json(readings))
}

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidQuery(_) | Error::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("API error: {}", self.0);
        } else {
            warn!("Rejected request: {}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}
