use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::hub::{HubError, HubHandle};
use crate::signaling::RoomSummary;

/// Body of `GET /status`, polled by clients scanning the LAN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub rooms: Vec<RoomSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

pub async fn get_status(
    State(hub): State<HubHandle>,
) -> Result<Json<StatusResponse>, HubUnavailable> {
    let rooms = hub.rooms().await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        rooms,
    }))
}

/// The hub task is gone; nothing useful can be served.
pub struct HubUnavailable;

impl From<HubError> for HubUnavailable {
    fn from(err: HubError) -> Self {
        error!("status query failed: {}", err);
        HubUnavailable
    }
}

impl IntoResponse for HubUnavailable {
    fn into_response(self) -> Response {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus {
                status: "unavailable",
            }),
        )
            .into_response()
    }
}
