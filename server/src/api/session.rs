use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use taxi_dispatch_lib::{
    trip_log::{NewTripLog, TripLogKind},
    vehicle::Vehicle,
};

use crate::{
    api::{client_ip, MessageResponse},
    auth,
    error::ApiError,
    server_state::ServerState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    pub id: i64,
    pub name: String,
    pub taxi_license_number: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub taxi_driver_license: String,
    pub vehicle: Option<Vehicle>,
    pub company: CompanyInfo,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub driver: DriverInfo,
    pub message: String,
}

/// POST /session — validates credentials against the driver directory,
/// issues a session token, flips the driver online and logs the login.
///
/// Unknown email, wrong password and a missing driver profile all get
/// the same generic rejection; only the log distinguishes them.
pub async fn authenticate(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (Some(email), Some(password)) = (request.email.as_deref(), request.password.as_deref())
    else {
        return Err(ApiError::Validation("Email and password are required".to_string()));
    };

    let Some(user) = state.data_manager.get_user_by_email(email).await? else {
        tracing::debug!("Login rejected for {email}: unknown user");
        return Err(invalid_credentials());
    };

    if !auth::verify_password(&user.password_hash, password) {
        tracing::debug!("Login rejected for {email}: wrong password");
        return Err(invalid_credentials());
    }

    let Some(driver) = state.data_manager.get_driver_by_user(user.id).await? else {
        tracing::debug!("Login rejected for {email}: no driver profile");
        return Err(invalid_credentials());
    };

    if !driver.status.is_active() {
        return Err(ApiError::Forbidden("Driver account is not active".to_string()));
    }

    let company = state.data_manager.get_company(driver.company_id).await?;
    if !company.status.is_active() {
        return Err(ApiError::Forbidden("Company account is not active".to_string()));
    }

    let vehicle = match driver.vehicle_id {
        Some(vehicle_id) => Some(state.data_manager.get_vehicle(vehicle_id).await?),
        None => None,
    };

    let token = state
        .signer
        .issue(user.id, driver.id, driver.company_id, driver.vehicle_id, &user.role);

    state.data_manager.set_driver_presence(driver.id, true).await?;

    let mut login = NewTripLog::bare(
        TripLogKind::DriverLogin,
        driver.company_id,
        driver.vehicle_id,
        driver.id,
        user.id,
    );
    login.log_details = Some(json!({
        "deviceId": request.device_id,
        "loginTime": Utc::now(),
        "ipAddress": client_ip(&headers, addr),
    }));
    state.data_manager.record_trip_event(&login).await?;

    tracing::info!("Driver {} authenticated", driver.id);

    Ok(Json(AuthResponse {
        token,
        driver: DriverInfo {
            id: driver.id,
            name: driver.full_name(),
            email: user.email,
            phone: driver.phone,
            taxi_driver_license: driver.taxi_driver_license,
            vehicle,
            company: CompanyInfo {
                id: company.id,
                name: company.name,
                taxi_license_number: company.taxi_license_number,
            },
        },
        message: "Authentication successful".to_string(),
    }))
}

/// DELETE /session — flips the driver offline and logs the logout.
pub async fn end_session(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let claims = auth::authorize(&headers, &state.signer)?;

    state.data_manager.set_driver_presence(claims.driver_id, false).await?;

    let mut logout = NewTripLog::bare(
        TripLogKind::DriverLogout,
        claims.company_id,
        claims.vehicle_id,
        claims.driver_id,
        claims.user_id,
    );
    logout.log_details = Some(json!({
        "logoutTime": Utc::now(),
        "ipAddress": client_ip(&headers, addr),
    }));
    state.data_manager.record_trip_event(&logout).await?;

    tracing::info!("Driver {} logged out", claims.driver_id);

    Ok(Json(MessageResponse { message: "Logout successful".to_string() }))
}

fn invalid_credentials() -> ApiError {
    ApiError::Auth("Invalid credentials".to_string())
}
