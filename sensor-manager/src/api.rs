//! Sensor Manager HTTP API - read-only status endpoints.
//!
//! Exposes three routes:
//! - `GET /api/status` - account and sensor status with latest readings
//! - `GET /api/sensors/:device_id` - one configured sensor
//! - `GET /api/discovery` - sensors found on the account

use crate::discovery::DiscoveredSensor;
use crate::manager::SensorManager;
use crate::sensor::{SensorHandler, SensorReadings};
use crate::status::{StatusEntry, ACCOUNT_THING_ID};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared state for the status API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<SensorManager>,
}

/// Response for `GET /api/status`.
#[derive(Serialize)]
pub struct StatusResponse {
    pub account: AccountInfo,
    pub sensors: Vec<SensorInfo>,
}

#[derive(Serialize)]
pub struct AccountInfo {
    /// Account id from the current token, 0 before the first authorization
    pub user_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusEntry>,
}

/// A single entry in the `sensors` list, also the `GET /api/sensors/:device_id` body.
#[derive(Serialize)]
pub struct SensorInfo {
    pub device_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusEntry>,
    pub readings: SensorReadings,
}

/// Response for `GET /api/discovery`.
#[derive(Serialize)]
pub struct DiscoveryResponse {
    pub enabled: bool,
    pub sensors: Vec<DiscoveredSensor>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ---------------------------------------------------------------------------
// Business logic (called from HTTP handlers and unit tests)
// ---------------------------------------------------------------------------

async fn sensor_info(state: &ApiState, sensor: &SensorHandler) -> SensorInfo {
    SensorInfo {
        device_id: sensor.device_id(),
        status: state.manager.board().get(sensor.thing_id()),
        readings: sensor.readings().await,
    }
}

pub async fn build_status(state: &ApiState) -> StatusResponse {
    let manager = &state.manager;
    let mut sensors = Vec::with_capacity(manager.sensors().len());
    for sensor in manager.sensors() {
        sensors.push(sensor_info(state, sensor).await);
    }

    StatusResponse {
        account: AccountInfo {
            user_id: manager.api().authenticator().user_id(),
            status: manager.board().get(ACCOUNT_THING_ID),
        },
        sensors,
    }
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(build_status(&state).await)
}

async fn get_sensor(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<u64>,
) -> Result<Json<SensorInfo>, AppError> {
    let sensor = state
        .manager
        .sensor(device_id)
        .ok_or_else(|| AppError::NotFound(format!("Sensor {} is not configured", device_id)))?;
    Ok(Json(sensor_info(&state, sensor).await))
}

async fn get_discovery(State(state): State<Arc<ApiState>>) -> Json<DiscoveryResponse> {
    let discovery = state.manager.discovery();
    Json(DiscoveryResponse {
        enabled: discovery.is_some(),
        sensors: discovery.map(|d| d.results()).unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

enum AppError {
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::NotFound(msg) = self;
        (StatusCode::NOT_FOUND, Json(ErrorResponse { error: msg })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/sensors/:device_id", get(get_sensor))
        .route("/api/discovery", get(get_discovery))
        .with_state(Arc::new(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
