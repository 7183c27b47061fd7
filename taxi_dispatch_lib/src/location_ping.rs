use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable location push. Pings are append-only; retention is an
/// external concern.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPing {
    pub id: i64,
    pub driver_id: i64,
    pub vehicle_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// The fields a driver supplies with a location push.
#[derive(Debug, Clone, Default)]
pub struct NewLocationPing {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
}
