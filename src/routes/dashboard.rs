use axum::{Json, extract::State};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::AppState;
use crate::error::AppResult;
use crate::model::{AccountId, Alert, Meter};
use crate::store::deadline;

const DASHBOARD_RECENT_COUNT: u64 = 10;

/// A recent reading labelled with its meter
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardReading {
    /// Device meter identifier
    pub meter_id: String,
    pub meter_name: String,
    pub recorded_at: DateTime<Utc>,
    pub volume: f64,
    pub flow_rate: f64,
    pub temperature: Option<f64>,
    pub is_leak: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    /// Active meters of the account
    pub meters: Vec<Meter>,
    /// Newest readings across those meters, newest first
    pub recent_readings: Vec<DashboardReading>,
    /// Today in the bucketing offset
    pub today: NaiveDate,
    /// Liters used this month across active meters
    pub month_to_date_volume: f64,
    pub active_alerts: Vec<Alert>,
}

/// Account dashboard
///
/// Active meters, their latest readings, this month's consumption and any
/// unresolved alerts.
#[utoipa::path(
    get,
    path = "/api/dashboard",
    params(("X-Account-Id" = i64, Header, description = "Authenticated account")),
    responses(
        (status = 200, description = "Dashboard computed", body = DashboardResponse),
        (status = 401, description = "Missing account"),
    ),
    tag = "dashboard"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    owner: AccountId,
) -> AppResult<Json<DashboardResponse>> {
    let timeout = state.config.storage_timeout();

    let meters: Vec<Meter> = deadline(timeout, state.meters.list_owned(owner))
        .await?
        .into_iter()
        .filter(|m| m.is_active)
        .collect();
    let ids: Vec<Uuid> = meters.iter().map(|m| m.id).collect();

    let labels: HashMap<Uuid, &Meter> = meters.iter().map(|m| (m.id, m)).collect();
    let recent_readings = deadline(
        timeout,
        state.readings.recent_across(&ids, DASHBOARD_RECENT_COUNT),
    )
    .await?
    .into_iter()
    .filter_map(|r| {
        let meter = labels.get(&r.meter_id)?;
        Some(DashboardReading {
            meter_id: meter.meter_id.clone(),
            meter_name: meter.name.clone(),
            recorded_at: r.recorded_at,
            volume: r.volume,
            flow_rate: r.flow_rate,
            temperature: r.temperature,
            is_leak: r.is_leak,
        })
    })
    .collect();

    let today = state.aggregator.today();
    let month_to_date_volume = state.aggregator.combined_month_to_date(&ids, today).await?;
    let active_alerts = state.alerts.active_alerts(owner).await?;

    Ok(Json(DashboardResponse {
        meters,
        recent_readings,
        today,
        month_to_date_volume,
        active_alerts,
    }))
}
