use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
#[cfg(feature = "sqlx")]
use sqlx::{sqlite::SqliteRow, FromRow, Row};

/// Lifecycle event kinds, in wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripLogKind {
    #[serde(rename = "DRIVER_LOGIN")]
    DriverLogin,
    #[serde(rename = "DRIVER_LOGOUT")]
    DriverLogout,
    #[serde(rename = "TRIP_START")]
    TripStart,
    #[serde(rename = "TRIP_END")]
    TripEnd,
}

impl TripLogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripLogKind::DriverLogin => "DRIVER_LOGIN",
            TripLogKind::DriverLogout => "DRIVER_LOGOUT",
            TripLogKind::TripStart => "TRIP_START",
            TripLogKind::TripEnd => "TRIP_END",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRIVER_LOGIN" => Some(TripLogKind::DriverLogin),
            "DRIVER_LOGOUT" => Some(TripLogKind::DriverLogout),
            "TRIP_START" => Some(TripLogKind::TripStart),
            "TRIP_END" => Some(TripLogKind::TripEnd),
            _ => None,
        }
    }

    /// Whether events of this kind are forwarded to the regulator.
    pub fn is_reportable(&self) -> bool {
        matches!(self, TripLogKind::TripStart | TripLogKind::TripEnd)
    }
}

/// One immutable trip lifecycle record. After creation only the two
/// report flags and the error text change, and only the compliance
/// reporter changes them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripLogEvent {
    pub id: i64,
    pub log_type: TripLogKind,
    pub parent_id: Option<i64>,
    pub company_id: i64,
    pub vehicle_id: Option<i64>,
    pub driver_id: i64,
    pub user_id: i64,
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
    pub start_reported: bool,
    pub end_reported: bool,
    pub report_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl FromRow<'_, SqliteRow> for TripLogEvent {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let log_type: String = row.try_get("log_type")?;
        let log_type = TripLogKind::parse(&log_type)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown log type: {log_type}").into()))?;

        // The detail payload is a schema-less JSON document stored as text.
        let log_details: Option<String> = row.try_get("log_details")?;
        let log_details = match log_details {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
            ),
            None => None,
        };

        Ok(Self {
            id: row.try_get("id")?,
            log_type,
            parent_id: row.try_get("parent_id")?,
            company_id: row.try_get("company_id")?,
            vehicle_id: row.try_get("vehicle_id")?,
            driver_id: row.try_get("driver_id")?,
            user_id: row.try_get("user_id")?,
            start_latitude: row.try_get("start_latitude")?,
            start_longitude: row.try_get("start_longitude")?,
            start_address: row.try_get("start_address")?,
            end_latitude: row.try_get("end_latitude")?,
            end_longitude: row.try_get("end_longitude")?,
            end_address: row.try_get("end_address")?,
            distance: row.try_get("distance")?,
            duration: row.try_get("duration")?,
            final_price: row.try_get("final_price")?,
            tariff_used: row.try_get("tariff_used")?,
            trip_start_time: row.try_get("trip_start_time")?,
            trip_end_time: row.try_get("trip_end_time")?,
            log_details,
            start_reported: row.try_get("start_reported")?,
            end_reported: row.try_get("end_reported")?,
            report_error: row.try_get("report_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Caller-supplied fields for a new trip log row.
#[derive(Debug, Clone)]
pub struct NewTripLog {
    pub log_type: TripLogKind,
    pub parent_id: Option<i64>,
    pub company_id: i64,
    pub vehicle_id: Option<i64>,
    pub driver_id: i64,
    pub user_id: i64,
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

impl NewTripLog {
    /// A bare event of the given kind for the given identity; coordinates
    /// and trip metrics stay unset.
    pub fn bare(
        log_type: TripLogKind,
        company_id: i64,
        vehicle_id: Option<i64>,
        driver_id: i64,
        user_id: i64,
    ) -> Self {
        Self {
            log_type,
            parent_id: None,
            company_id,
            vehicle_id,
            driver_id,
            user_id,
            start_latitude: None,
            start_longitude: None,
            start_address: None,
            end_latitude: None,
            end_longitude: None,
            end_address: None,
            distance: None,
            duration: None,
            final_price: None,
            tariff_used: None,
            trip_start_time: None,
            trip_end_time: None,
            log_details: None,
        }
    }
}
