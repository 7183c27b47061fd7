use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::{company::CompanySummary, status::AccountStatus, vehicle::Vehicle};

/// A driver profile. The cached current location and the online flag
/// together form the driver's presence; only the session authority
/// (online flag) and the presence store (location fields) mutate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: i64,
    pub user_id: i64,
    pub company_id: i64,
    pub vehicle_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub taxi_driver_license: String,
    pub status: AccountStatus,
    pub is_online: bool,
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(feature = "sqlx")]
impl FromRow<'_, SqliteRow> for Driver {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let status = AccountStatus::parse(&status)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown driver status: {status}").into()))?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            company_id: row.try_get("company_id")?,
            vehicle_id: row.try_get("vehicle_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone: row.try_get("phone")?,
            taxi_driver_license: row.try_get("taxi_driver_license")?,
            status,
            is_online: row.try_get("is_online")?,
            current_latitude: row.try_get("current_latitude")?,
            current_longitude: row.try_get("current_longitude")?,
            last_location_update: row.try_get("last_location_update")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Seed/test insert payload for a driver profile; the directory service
/// owns these rows in production.
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub user_id: i64,
    pub company_id: i64,
    pub vehicle_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub taxi_driver_license: String,
    pub status: AccountStatus,
}

/// Proximity-query read model: one online driver with a fresh location,
/// joined with its vehicle and company.
#[derive(Debug, Clone)]
pub struct AvailableDriver {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_location_update: DateTime<Utc>,
    pub vehicle: Option<Vehicle>,
    pub company: CompanySummary,
}

impl AvailableDriver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
