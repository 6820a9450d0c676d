//! Reading Routes
//!
//! Endpoints the MK2 device and scripts use to feed and inspect a user's
//! readings log. Every write is visible to open dashboards immediately.
//!
//! - POST /api/v1/readings - Push one reading
//! - GET /api/v1/readings - List readings (`last`, `end_at`)
//! - GET /api/v1/readings/latest - Newest reading
//! - DELETE /api/v1/readings - Delete all readings

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{PushReadingRequest, ReadingsQuery, ReadingsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::dashboard::delete_all;
use crate::storage::{LogQuery, Reading};
use crate::websocket::ServerMessage;

/// POST /api/v1/readings
pub async fn push_reading(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PushReadingRequest>,
) -> ApiResult<(StatusCode, Json<Reading>)> {
    let session = state.authenticate(&headers)?;

    let reading = req.into_reading();
    if [reading.power, reading.diverted, reading.load]
        .iter()
        .flatten()
        .any(|v| !v.is_finite())
    {
        return Err(ApiError::Validation("Values must be finite numbers".to_string()));
    }

    state.readings_for(&session).push(reading.clone())?;
    tracing::debug!(uid = %session.uid, timestamp = reading.timestamp, "Reading pushed");

    Ok((StatusCode::CREATED, Json(reading)))
}

/// GET /api/v1/readings?last=N&end_at=T
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ReadingsQuery>,
) -> ApiResult<Json<ReadingsResponse>> {
    let session = state.authenticate(&headers)?;

    let last = params.last.unwrap_or(state.dashboard.table_page_size);
    if last == 0 {
        return Err(ApiError::Validation("last must be at least 1".to_string()));
    }

    let mut query = LogQuery::all().limit_to_last(last);
    if let Some(end_at) = params.end_at {
        query = query.end_at(end_at);
    }

    let readings = state.readings_for(&session).get(&query)?;
    Ok(Json(ReadingsResponse {
        count: readings.len(),
        readings,
    }))
}

/// GET /api/v1/readings/latest
pub async fn latest_reading(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Reading>> {
    let session = state.authenticate(&headers)?;

    state
        .readings_for(&session)
        .last()?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No readings yet".to_string()))
}

/// DELETE /api/v1/readings
pub async fn delete_readings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let session = state.authenticate(&headers)?;

    let removed = delete_all(&state.readings_for(&session))?;
    tracing::info!(uid = %session.uid, removed, "All readings deleted via API");

    state
        .ws_hub
        .send_to_user(&session.uid, ServerMessage::DataDeleted { removed })
        .await;

    Ok(StatusCode::NO_CONTENT)
}
