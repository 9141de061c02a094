use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::{Alert, AlertType};

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    /// Device meter identifier
    pub meter_id: String,
    pub meter_name: String,
    pub alert_type: AlertType,
    pub message: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertResponse {
    pub(super) fn new(alert: Alert, meter_id: String, meter_name: String) -> Self {
        Self {
            id: alert.id,
            meter_id,
            meter_name,
            alert_type: alert.alert_type,
            message: alert.message,
            is_resolved: alert.is_resolved,
            created_at: alert.created_at,
            resolved_at: alert.resolved_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// Alerts to resolve; unknown, foreign or already resolved ids are skipped
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveResponse {
    /// Number of alerts that transitioned to resolved
    pub resolved: u64,
}
