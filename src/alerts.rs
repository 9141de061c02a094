//! Creation and one-way resolution of alerts.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::model::{AccountId, Alert, AlertType};
use crate::store::{AlertStore, StoreResult, deadline};

#[derive(Clone)]
pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    dedup_open: bool,
    timeout: Duration,
}

impl AlertManager {
    /// With `dedup_open` false every raise inserts a new alert, even if an
    /// identical one is still open.
    pub fn new(store: Arc<dyn AlertStore>, dedup_open: bool, timeout: Duration) -> Self {
        Self {
            store,
            dedup_open,
            timeout,
        }
    }

    /// Record a new open alert for `meter`.
    ///
    /// With deduplication enabled, an open alert of the same type on the same
    /// meter is returned instead of inserting another.
    ///
    /// # Errors
    ///
    /// Propagates store failures and timeouts.
    pub async fn raise(&self, meter: Uuid, alert_type: AlertType, message: String) -> StoreResult<Alert> {
        if self.dedup_open
            && let Some(existing) =
                deadline(self.timeout, self.store.find_open(meter, alert_type)).await?
        {
            tracing::debug!(alert_id = %existing.id, %alert_type, "alert_deduplicated");
            return Ok(existing);
        }

        let alert = Alert::open(meter, alert_type, message, Utc::now());
        let alert = deadline(self.timeout, self.store.insert(alert)).await?;
        tracing::info!(
            alert_id = %alert.id,
            meter = %meter,
            %alert_type,
            "alert_raised"
        );
        Ok(alert)
    }

    /// Resolve the given alerts of `owner`. Already-resolved or foreign alerts
    /// are skipped and not counted.
    ///
    /// # Errors
    ///
    /// Propagates store failures and timeouts.
    pub async fn resolve(&self, owner: AccountId, ids: &[Uuid]) -> StoreResult<u64> {
        let resolved = deadline(self.timeout, self.store.resolve(owner, ids, Utc::now())).await?;
        tracing::info!(
            account = %owner,
            requested = ids.len(),
            resolved,
            "alerts_resolved"
        );
        Ok(resolved)
    }

    /// Unresolved alerts across all of `owner`'s meters, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures and timeouts.
    pub async fn active_alerts(&self, owner: AccountId) -> StoreResult<Vec<Alert>> {
        deadline(self.timeout, self.store.active_for_owner(owner)).await
    }
}
