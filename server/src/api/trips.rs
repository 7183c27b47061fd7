use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taxi_dispatch_data_management::compliance::ReportJob;
use taxi_dispatch_lib::{
    compliance::ReportKind,
    trip_log::{NewTripLog, TripLogEvent, TripLogKind},
};

use crate::{auth, error::ApiError, server_state::ServerState};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripLogRequest {
    pub log_type: Option<String>,
    pub parent_id: Option<i64>,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub start_address: Option<String>,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub end_address: Option<String>,
    pub distance: Option<f64>,
    pub duration: Option<i64>,
    pub final_price: Option<f64>,
    pub tariff_used: Option<String>,
    pub trip_start_time: Option<DateTime<Utc>>,
    pub trip_end_time: Option<DateTime<Utc>>,
    pub log_details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct TripLogResponse {
    pub id: i64,
    pub message: String,
}

/// POST /trips — persists one lifecycle event. TRIP_START/TRIP_END are
/// handed to the compliance queue after the commit; the regulator's
/// fate never reaches this caller.
pub async fn record_trip(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<TripLogRequest>,
) -> Result<Json<TripLogResponse>, ApiError> {
    let claims = auth::authorize(&headers, &state.signer)?;

    let log_type = request
        .log_type
        .as_deref()
        .and_then(TripLogKind::parse)
        .ok_or_else(|| ApiError::Validation("A valid logType is required".to_string()))?;

    let new = NewTripLog {
        log_type,
        parent_id: request.parent_id,
        company_id: claims.company_id,
        vehicle_id: claims.vehicle_id,
        driver_id: claims.driver_id,
        user_id: claims.user_id,
        start_latitude: request.start_latitude,
        start_longitude: request.start_longitude,
        start_address: request.start_address,
        end_latitude: request.end_latitude,
        end_longitude: request.end_longitude,
        end_address: request.end_address,
        distance: request.distance,
        duration: request.duration,
        final_price: request.final_price,
        tariff_used: request.tariff_used,
        trip_start_time: request.trip_start_time,
        trip_end_time: request.trip_end_time,
        log_details: request.log_details,
    };

    let event = state.data_manager.record_trip_event(&new).await?;

    match event.log_type {
        TripLogKind::TripStart => state.reporter.submit(ReportJob {
            trip_log_id: event.id,
            kind: ReportKind::TripStart,
            payload: json!({
                "driverId": event.driver_id,
                "vehicleId": event.vehicle_id,
                "startTime": event.trip_start_time,
                "startLocation": {
                    "latitude": event.start_latitude,
                    "longitude": event.start_longitude,
                },
                "tariff": event.tariff_used,
            }),
        }),
        TripLogKind::TripEnd => state.reporter.submit(ReportJob {
            trip_log_id: event.id,
            kind: ReportKind::TripEnd,
            payload: json!({
                "driverId": event.driver_id,
                "vehicleId": event.vehicle_id,
                "endTime": event.trip_end_time,
                "endLocation": {
                    "latitude": event.end_latitude,
                    "longitude": event.end_longitude,
                },
                "distance": event.distance,
                "duration": event.duration,
                "finalPrice": event.final_price,
                "tariff": event.tariff_used,
            }),
        }),
        _ => {}
    }

    Ok(Json(TripLogResponse { id: event.id, message: "Trip logged successfully".to_string() }))
}

#[derive(Debug, Deserialize)]
pub struct TripListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
pub struct TripListResponse {
    pub trips: Vec<TripLogEvent>,
    pub pagination: Pagination,
}

/// GET /trips — the authenticated driver's events, newest first.
pub async fn list_trips(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(params): Query<TripListParams>,
) -> Result<Json<TripListResponse>, ApiError> {
    let claims = auth::authorize(&headers, &state.signer)?;

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let (trips, total) = state.data_manager.list_trip_events(claims.driver_id, page, limit).await?;

    Ok(Json(TripListResponse {
        trips,
        pagination: Pagination { page, limit, total, pages: total.div_ceil(limit) },
    }))
}
