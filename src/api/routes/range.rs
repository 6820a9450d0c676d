//! Chart Range Routes
//!
//! - GET /api/v1/range - Stored and effective chart range
//! - PUT /api/v1/range - Store a new range; open dashboards rebuild their charts

use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::api::dto::{RangeResponse, SetRangeRequest};
use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// GET /api/v1/range
pub async fn get_range(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<RangeResponse>> {
    let session = state.authenticate(&headers)?;
    let range = state.range_for(&session).get()?;

    Ok(Json(RangeResponse {
        range,
        effective: range.unwrap_or(state.dashboard.default_chart_range),
    }))
}

/// PUT /api/v1/range
pub async fn set_range(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetRangeRequest>,
) -> ApiResult<Json<RangeResponse>> {
    let session = state.authenticate(&headers)?;
    state.range_for(&session).set(req.range)?;

    tracing::info!(uid = %session.uid, range = req.range, "Chart range updated via API");

    Ok(Json(RangeResponse {
        range: Some(req.range),
        effective: req.range,
    }))
}
