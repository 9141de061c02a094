use axum::{
    Form, Json,
    extract::{Path, Query, State, rejection::FormRejection, rejection::QueryRejection},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::ingest::IngestStatus;
use crate::model::{AccountId, SortOrder, StoredReading};
use crate::routes::{query_input, resolve_meter};
use crate::store::deadline;
use crate::validator::RawReading;

/// Maximum time range for a raw readings query
const MAX_TIME_RANGE_DAYS: i64 = 90;

const DEFAULT_RECENT_COUNT: u64 = 10;
const MAX_RECENT_COUNT: u64 = 1000;

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub status: IngestStatus,
    /// Present on partial success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub reading_id: i64,
    pub is_leak: bool,
    /// Alerts raised for this reading
    pub alert_ids: Vec<Uuid>,
}

/// Submit a reading
///
/// Accepts a form-encoded reading for one of the caller's meters. The reading
/// is stored, classified, and may raise alerts.
#[utoipa::path(
    post,
    path = "/api/readings",
    request_body(content = RawReading, content_type = "application/x-www-form-urlencoded"),
    params(("X-Account-Id" = i64, Header, description = "Authenticated account")),
    responses(
        (status = 200, description = "Reading stored", body = IngestResponse),
        (status = 400, description = "Invalid reading"),
        (status = 401, description = "Missing account"),
        (status = 404, description = "Meter not found"),
        (status = 503, description = "Storage unavailable"),
    ),
    tag = "readings"
)]
pub async fn ingest_reading(
    State(state): State<AppState>,
    owner: AccountId,
    form: Result<Form<RawReading>, FormRejection>,
) -> AppResult<Json<IngestResponse>> {
    let Form(raw) = form.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    let receipt = state.ingestion.ingest(owner, &raw).await?;

    let message = match receipt.status {
        IngestStatus::Success => None,
        IngestStatus::PartialSuccess => {
            let failed: Vec<&str> = receipt.failed_alerts.iter().map(|t| t.as_str()).collect();
            tracing::warn!(
                account = %owner,
                reading_id = receipt.reading.id,
                failed = ?failed,
                "ingest_partial_success"
            );
            Some(format!(
                "Reading stored, but alerts could not be recorded: {}",
                failed.join(", ")
            ))
        }
    };

    Ok(Json(IngestResponse {
        status: receipt.status,
        message,
        reading_id: receipt.reading.id,
        is_leak: receipt.reading.is_leak,
        alert_ids: receipt.alerts.iter().map(|a| a.id).collect(),
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReadingsQuery {
    /// Start time (inclusive, ISO 8601)
    pub start: DateTime<Utc>,
    /// End time (inclusive, ISO 8601)
    pub end: DateTime<Utc>,
    /// asc (default) or desc
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingsResponse {
    pub meter_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub readings: Vec<StoredReading>,
}

/// Get readings for a meter in a time range
#[utoipa::path(
    get,
    path = "/api/meters/{meter_id}/readings",
    params(
        ("meter_id" = String, Path, description = "Device meter identifier"),
        ("X-Account-Id" = i64, Header, description = "Authenticated account"),
        ReadingsQuery
    ),
    responses(
        (status = 200, description = "Readings retrieved", body = ReadingsResponse),
        (status = 400, description = "Invalid time range"),
        (status = 404, description = "Meter not found"),
    ),
    tag = "readings"
)]
pub async fn get_meter_readings(
    State(state): State<AppState>,
    owner: AccountId,
    Path(meter_id): Path<String>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> AppResult<Json<ReadingsResponse>> {
    let query = query_input(query)?;

    if query.end < query.start {
        return Err(AppError::InvalidInput(
            "end time must not be before start time".to_string(),
        ));
    }
    if query.end - query.start > Duration::days(MAX_TIME_RANGE_DAYS) {
        return Err(AppError::InvalidInput(format!(
            "time range exceeds maximum of {MAX_TIME_RANGE_DAYS} days"
        )));
    }

    let meter = resolve_meter(&state, owner, &meter_id).await?;
    let readings = deadline(
        state.config.storage_timeout(),
        state
            .readings
            .query_range(meter.id, query.start, query.end, query.order),
    )
    .await?;

    Ok(Json(ReadingsResponse {
        meter_id: meter.meter_id,
        start: query.start,
        end: query.end,
        readings,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecentQuery {
    /// Number of readings (default 10, max 1000)
    pub count: Option<u64>,
}

/// Get the most recent readings of a meter, newest first
#[utoipa::path(
    get,
    path = "/api/meters/{meter_id}/readings/recent",
    params(
        ("meter_id" = String, Path, description = "Device meter identifier"),
        ("X-Account-Id" = i64, Header, description = "Authenticated account"),
        RecentQuery
    ),
    responses(
        (status = 200, description = "Readings retrieved", body = Vec<StoredReading>),
        (status = 400, description = "Invalid count"),
        (status = 404, description = "Meter not found"),
    ),
    tag = "readings"
)]
pub async fn get_recent_readings(
    State(state): State<AppState>,
    owner: AccountId,
    Path(meter_id): Path<String>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> AppResult<Json<Vec<StoredReading>>> {
    let count = query_input(query)?.count.unwrap_or(DEFAULT_RECENT_COUNT);
    if !(1..=MAX_RECENT_COUNT).contains(&count) {
        return Err(AppError::InvalidInput(format!(
            "count must be between 1 and {MAX_RECENT_COUNT}"
        )));
    }

    let meter = resolve_meter(&state, owner, &meter_id).await?;
    let readings = deadline(
        state.config.storage_timeout(),
        state.readings.recent(meter.id, count),
    )
    .await?;

    Ok(Json(readings))
}
