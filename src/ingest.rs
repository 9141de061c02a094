//! Per-reading ingestion: validate, classify, persist, then alert.
//!
//! Everything before the append can fail without side effects. Once
//! validation passes, the append and the alerting that follows run on a
//! spawned task, so a caller that goes away mid-request cannot leave a stored
//! reading without its alerts. Alert failures after a successful append do
//! not undo the reading; they downgrade the result to partial success.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::alerts::AlertManager;
use crate::detection::{DetectionEngine, RuleContext, Verdict};
use crate::error::{AppError, AppResult};
use crate::model::{AccountId, Alert, AlertType, NewReading, StoredReading};
use crate::store::{MeterDirectory, ReadingStore, StoreError, deadline};
use crate::validator::{self, RawReading, ValidatedReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    /// The reading is stored but at least one alert could not be raised
    PartialSuccess,
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub status: IngestStatus,
    pub reading: StoredReading,
    pub alerts: Vec<Alert>,
    /// Alert types that were detected but could not be persisted
    pub failed_alerts: Vec<AlertType>,
}

#[derive(Clone)]
pub struct IngestionService {
    directory: Arc<dyn MeterDirectory>,
    readings: Arc<dyn ReadingStore>,
    alerts: AlertManager,
    engine: Arc<DetectionEngine>,
    reject_inactive: bool,
    timeout: Duration,
}

impl IngestionService {
    pub fn new(
        directory: Arc<dyn MeterDirectory>,
        readings: Arc<dyn ReadingStore>,
        alerts: AlertManager,
        engine: Arc<DetectionEngine>,
        reject_inactive: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            directory,
            readings,
            alerts,
            engine,
            reject_inactive,
            timeout,
        }
    }

    /// Ingest one raw reading on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` or `NotFound` from validation (nothing stored),
    /// `Storage` when the lookup or the append fails or times out.
    /// Alert failures are reported through [`IngestStatus::PartialSuccess`].
    pub async fn ingest(&self, owner: AccountId, raw: &RawReading) -> AppResult<IngestReceipt> {
        let validated = tokio::time::timeout(
            self.timeout,
            validator::validate(
                raw,
                owner,
                self.directory.as_ref(),
                self.reject_inactive,
                Utc::now(),
            ),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.timeout))??;

        let window = self.engine.history_window();
        let history = if window > 0 {
            deadline(self.timeout, self.readings.recent(validated.meter.id, window)).await?
        } else {
            Vec::new()
        };

        let verdict = self.engine.evaluate(&RuleContext {
            reading: &validated,
            meter: &validated.meter,
            history: &history,
        });

        let service = self.clone();
        tokio::spawn(async move { service.commit(validated, verdict).await })
            .await
            .map_err(|e| AppError::Internal(format!("ingestion task failed: {e}")))?
    }

    async fn commit(&self, reading: ValidatedReading, verdict: Verdict) -> AppResult<IngestReceipt> {
        let meter = reading.meter;
        let new = NewReading {
            meter_id: meter.id,
            recorded_at: Some(reading.recorded_at),
            volume: reading.volume,
            flow_rate: reading.flow_rate,
            temperature: reading.temperature,
            is_leak: verdict.is_leak,
        };

        let stored = deadline(self.timeout, self.readings.append(new))
            .await
            .inspect_err(|e| {
                tracing::error!(meter_id = %meter.meter_id, error = %e, "reading_append_failed");
            })?;

        tracing::debug!(
            meter_id = %meter.meter_id,
            reading_id = stored.id,
            flow_rate = stored.flow_rate,
            is_leak = stored.is_leak,
            "reading_stored"
        );

        let mut alerts = Vec::with_capacity(verdict.candidates.len());
        let mut failed_alerts = Vec::new();
        for candidate in verdict.candidates {
            let alert_type = candidate.alert_type;
            match self.alerts.raise(meter.id, alert_type, candidate.message).await {
                Ok(alert) => alerts.push(alert),
                Err(e) => {
                    tracing::warn!(
                        meter_id = %meter.meter_id,
                        reading_id = stored.id,
                        rule = candidate.rule,
                        error = %e,
                        "alert_raise_failed"
                    );
                    failed_alerts.push(alert_type);
                }
            }
        }

        let status = if failed_alerts.is_empty() {
            IngestStatus::Success
        } else {
            IngestStatus::PartialSuccess
        };

        Ok(IngestReceipt {
            status,
            reading: stored,
            alerts,
            failed_alerts,
        })
    }
}
