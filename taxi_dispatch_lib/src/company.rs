use serde::{Deserialize, Serialize};
#[cfg(feature = "sqlx")]
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::status::AccountStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub taxi_license_number: Option<String>,
    pub status: AccountStatus,
}

#[cfg(feature = "sqlx")]
impl FromRow<'_, SqliteRow> for Company {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let status = AccountStatus::parse(&status)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown company status: {status}").into()))?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            taxi_license_number: row.try_get("taxi_license_number")?,
            status,
        })
    }
}

/// The slice of a company that rider-facing responses carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySummary {
    pub id: i64,
    pub name: String,
}
