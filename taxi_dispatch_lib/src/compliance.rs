use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
#[cfg(feature = "sqlx")]
use sqlx::{sqlite::SqliteRow, FromRow, Row};

/// Which regulator call an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    #[serde(rename = "TRIP_START")]
    TripStart,
    #[serde(rename = "TRIP_END")]
    TripEnd,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::TripStart => "TRIP_START",
            ReportKind::TripEnd => "TRIP_END",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRIP_START" => Some(ReportKind::TripStart),
            "TRIP_END" => Some(ReportKind::TripEnd),
            _ => None,
        }
    }

    /// Path segment under the regulator base URL.
    pub fn endpoint_suffix(&self) -> &'static str {
        match self {
            ReportKind::TripStart => "trip_start",
            ReportKind::TripEnd => "trip_end",
        }
    }
}

/// Outcome of one outbound call, ready to be appended to the audit trail.
#[derive(Debug, Clone)]
pub struct NewReportAttempt {
    pub trip_log_id: i64,
    pub request_kind: ReportKind,
    pub endpoint: String,
    pub payload: Value,
    pub response: Option<String>,
    pub status_code: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Audit record of one outbound regulator call. Append-only: retries
/// create new attempts, existing rows are never touched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReportAttempt {
    pub id: i64,
    pub trip_log_id: i64,
    pub request_kind: ReportKind,
    pub endpoint: String,
    pub payload: Value,
    pub response: Option<String>,
    pub status_code: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl FromRow<'_, SqliteRow> for ComplianceReportAttempt {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let request_kind: String = row.try_get("request_kind")?;
        let request_kind = ReportKind::parse(&request_kind)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown request kind: {request_kind}").into()))?;

        let payload: String = row.try_get("payload")?;
        let payload = serde_json::from_str(&payload)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self {
            id: row.try_get("id")?,
            trip_log_id: row.try_get("trip_log_id")?,
            request_kind,
            endpoint: row.try_get("endpoint")?,
            payload,
            response: row.try_get("response")?,
            status_code: row.try_get("status_code")?,
            success: row.try_get("success")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
