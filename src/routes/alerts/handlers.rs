use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::model::AccountId;
use crate::store::deadline;

use super::types::{AlertResponse, ResolveRequest, ResolveResponse};

/// Upper bound on ids in one resolve request
const MAX_RESOLVE_IDS: usize = 1000;

/// List unresolved alerts across the caller's meters, newest first
#[utoipa::path(
    get,
    path = "/api/alerts/active",
    params(("X-Account-Id" = i64, Header, description = "Authenticated account")),
    responses(
        (status = 200, description = "Active alerts retrieved", body = Vec<AlertResponse>),
        (status = 401, description = "Missing account"),
    ),
    tag = "alerts"
)]
pub async fn list_active_alerts(
    State(state): State<AppState>,
    owner: AccountId,
) -> AppResult<Json<Vec<AlertResponse>>> {
    let alerts = state.alerts.active_alerts(owner).await?;

    let meters: HashMap<Uuid, (String, String)> =
        deadline(state.config.storage_timeout(), state.meters.list_owned(owner))
            .await?
            .into_iter()
            .map(|m| (m.id, (m.meter_id, m.name)))
            .collect();

    let response = alerts
        .into_iter()
        .filter_map(|a| {
            let (meter_id, name) = meters.get(&a.meter_id)?.clone();
            Some(AlertResponse::new(a, meter_id, name))
        })
        .collect();

    Ok(Json(response))
}

/// Resolve alerts
///
/// Only open alerts on the caller's meters transition. Repeating a request
/// resolves nothing further.
#[utoipa::path(
    post,
    path = "/api/alerts/resolve",
    params(("X-Account-Id" = i64, Header, description = "Authenticated account")),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Alerts resolved", body = ResolveResponse),
        (status = 400, description = "Invalid request body"),
        (status = 401, description = "Missing account"),
    ),
    tag = "alerts"
)]
pub async fn resolve_alerts(
    State(state): State<AppState>,
    owner: AccountId,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> AppResult<Json<ResolveResponse>> {
    let Json(request) = body.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    if request.ids.len() > MAX_RESOLVE_IDS {
        return Err(AppError::InvalidInput(format!(
            "at most {MAX_RESOLVE_IDS} alert ids per request"
        )));
    }
    if request.ids.is_empty() {
        return Ok(Json(ResolveResponse { resolved: 0 }));
    }

    let resolved = state.alerts.resolve(owner, &request.ids).await?;
    Ok(Json(ResolveResponse { resolved }))
}
