use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};
use serde_json::json;
use taxi_dispatch_lib::{
    company::CompanySummary, geo, location_ping::NewLocationPing, vehicle::Vehicle,
};

use crate::{auth, error::ApiError, server_state::ServerState};

/// Locations older than this never appear in proximity results.
pub const FRESHNESS_WINDOW_MINUTES: i64 = 5;

pub const DEFAULT_RADIUS_KM: f64 = 10.0;

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub id: i64,
    pub message: String,
}

/// POST /location — stores one ping, refreshes the driver's cached
/// presence, and publishes a presence-changed notification.
pub async fn update_location(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<LocationRequest>,
) -> Result<Json<LocationResponse>, ApiError> {
    let claims = auth::authorize(&headers, &state.signer)?;

    let (Some(latitude), Some(longitude)) = (request.latitude, request.longitude) else {
        return Err(ApiError::Validation("Latitude and longitude are required".to_string()));
    };

    let ping = NewLocationPing {
        latitude,
        longitude,
        accuracy: request.accuracy,
        speed: request.speed,
        heading: request.heading,
        altitude: request.altitude,
    };
    let ping = state
        .data_manager
        .record_location(claims.driver_id, claims.vehicle_id, &ping)
        .await?;

    // Only production of the notification is guaranteed; transport to
    // subscribers is their concern. No receivers is fine.
    let notification = json!({
        "driverId": ping.driver_id,
        "vehicleId": ping.vehicle_id,
        "companyId": claims.company_id,
        "latitude": ping.latitude,
        "longitude": ping.longitude,
        "timestamp": ping.created_at,
    });
    let _ = state.tx.send(notification.to_string());

    Ok(Json(LocationResponse {
        id: ping.id,
        message: "Location updated successfully".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDriver {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub location: DriverLocation,
    pub distance: f64,
    pub estimated_arrival_minutes: i64,
    pub vehicle: Option<Vehicle>,
    pub company: CompanySummary,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Center {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub drivers: Vec<NearbyDriver>,
    pub count: usize,
    pub center: Center,
    pub radius: f64,
}

/// GET /location — rider-facing proximity query. Candidates are online,
/// active, located and fresh; results are distance-ascending with a
/// driver-id tiebreak, and an empty list is a normal answer.
pub async fn nearby_drivers(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<NearbyResponse>, ApiError> {
    let (Some(lat), Some(lng)) = (params.lat, params.lng) else {
        return Err(ApiError::Validation("Latitude and longitude are required".to_string()));
    };
    let radius = params.radius.unwrap_or(DEFAULT_RADIUS_KM);

    let cutoff = Utc::now() - Duration::minutes(FRESHNESS_WINDOW_MINUTES);
    let center = Point::new(lng, lat);

    let mut candidates: Vec<_> = state
        .data_manager
        .list_available_drivers(cutoff)
        .await?
        .into_iter()
        .map(|driver| {
            let distance = geo::distance_km(center, Point::new(driver.longitude, driver.latitude));
            (driver, distance)
        })
        .filter(|(_, distance)| *distance <= radius)
        .collect();

    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));

    let drivers: Vec<NearbyDriver> = candidates
        .into_iter()
        .map(|(driver, distance)| NearbyDriver {
            id: driver.id,
            name: driver.full_name(),
            phone: driver.phone,
            location: DriverLocation {
                latitude: driver.latitude,
                longitude: driver.longitude,
                last_update: driver.last_location_update,
            },
            distance: (distance * 100.0).round() / 100.0,
            // Rough estimate: 2 minutes per kilometer.
            estimated_arrival_minutes: (distance * 2.0).ceil() as i64,
            vehicle: driver.vehicle,
            company: driver.company,
            status: "available",
        })
        .collect();

    Ok(Json(NearbyResponse {
        count: drivers.len(),
        drivers,
        center: Center { lat, lng },
        radius,
    }))
}
