use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use taxi_dispatch_lib::compliance::{NewReportAttempt, ReportKind};
use tokio::sync::mpsc;

use crate::{database::db::DispatchDatabase, DataManagerError};

/// Jobs queued beyond this are dropped (with a warning); the event's
/// report flag stays false, which is the reconciliation signal.
pub const REPORT_QUEUE_CAPACITY: usize = 64;

/// One regulator call waiting in the outbound queue.
#[derive(Debug)]
pub struct ReportJob {
    pub trip_log_id: i64,
    pub kind: ReportKind,
    pub payload: Value,
}

/// Cheap handle the request path uses to hand off a report without
/// waiting on the network.
#[derive(Clone)]
pub struct ReporterHandle {
    tx: mpsc::Sender<ReportJob>,
}

impl ReporterHandle {
    pub fn submit(&self, job: ReportJob) {
        if let Err(err) = self.tx.try_send(job) {
            tracing::warn!("Dropping compliance report job: {err}");
        }
    }
}

/// Forwards TRIP_START/TRIP_END events to the regulator endpoint and
/// audits every outcome. Failures never propagate to the caller; they
/// end up in the attempt trail and the event's error text.
#[derive(Clone)]
pub struct ComplianceReporter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    database: DispatchDatabase,
}

impl ComplianceReporter {
    pub fn new(
        database: DispatchDatabase,
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, DataManagerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DataManagerError::Reporter(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            database,
        })
    }

    /// Moves the reporter into a single worker task draining a bounded
    /// queue, and returns the submission handle.
    pub fn spawn(self) -> ReporterHandle {
        let (tx, mut rx) = mpsc::channel::<ReportJob>(REPORT_QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                self.report(job.trip_log_id, job.kind, job.payload).await;
            }
        });

        ReporterHandle { tx }
    }

    /// Performs one outbound call and records its outcome: an append-only
    /// attempt row, plus the event's report flag on success or its error
    /// text on failure. A timeout counts as a transport failure
    /// (status code 0). No automatic retry.
    pub async fn report(&self, trip_log_id: i64, kind: ReportKind, payload: Value) {
        let endpoint = format!("{}/{}", self.base_url, kind.endpoint_suffix());

        let outcome = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await;

        let attempt = match outcome {
            Ok(response) => {
                let status_code = response.status().as_u16() as i64;
                let body = response.text().await.unwrap_or_default();
                let success = (200..300).contains(&status_code);
                let error_message =
                    (!success).then(|| format!("regulator returned status {status_code}"));

                NewReportAttempt {
                    trip_log_id,
                    request_kind: kind,
                    endpoint,
                    payload,
                    response: Some(body),
                    status_code,
                    success,
                    error_message,
                }
            }
            Err(err) => NewReportAttempt {
                trip_log_id,
                request_kind: kind,
                endpoint,
                payload,
                response: None,
                status_code: 0,
                success: false,
                error_message: Some(err.to_string()),
            },
        };

        let now = Utc::now();

        if let Err(err) = self.database.insert_report_attempt(&attempt, now).await {
            tracing::error!("Failed to record compliance attempt for trip log {trip_log_id}: {err}");
        }

        let flag_update = if attempt.success {
            self.database.mark_trip_reported(trip_log_id, kind, now).await
        } else {
            let detail = attempt.error_message.as_deref().unwrap_or("unknown failure");
            tracing::warn!("Compliance report for trip log {trip_log_id} failed: {detail}");
            self.database.set_trip_report_error(trip_log_id, detail, now).await
        };

        if let Err(err) = flag_update {
            tracing::error!("Failed to update report state for trip log {trip_log_id}: {err}");
        }
    }
}
