//! Persistence boundary for meters, readings and alerts.
//!
//! The engine only talks to these traits; [`MemoryStore`] and
//! [`DatabaseStore`] are the two backends. Every call issued by the engine is
//! wrapped in [`deadline`] so a slow backend surfaces as a transient
//! [`StoreError::Timeout`] instead of a hung request.

pub mod database;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::model::{AccountId, Alert, AlertType, Meter, NewReading, SortOrder, StoredReading};

pub use database::DatabaseStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Meter {0} does not exist")]
    MissingMeter(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only view of the meter registry maintained by the web collaborator.
#[async_trait]
pub trait MeterDirectory: Send + Sync {
    /// Look up a meter by its device identifier, scoped to one owner.
    async fn find_owned(&self, owner: AccountId, meter_id: &str) -> StoreResult<Option<Meter>>;

    /// All meters of an owner, newest registration first.
    async fn list_owned(&self, owner: AccountId) -> StoreResult<Vec<Meter>>;
}

/// Append-only time series of readings.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert one reading, assigning `recorded_at` when absent.
    async fn append(&self, reading: NewReading) -> StoreResult<StoredReading>;

    /// Readings with `from <= recorded_at <= to`, ordered by `(recorded_at, id)`.
    async fn query_range(
        &self,
        meter: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        order: SortOrder,
    ) -> StoreResult<Vec<StoredReading>>;

    /// The `limit` most recent readings of one meter, newest first.
    async fn recent(&self, meter: Uuid, limit: u64) -> StoreResult<Vec<StoredReading>>;

    /// The `limit` most recent readings across several meters, newest first.
    async fn recent_across(&self, meters: &[Uuid], limit: u64) -> StoreResult<Vec<StoredReading>>;

    /// Number of readings stored for a meter. Readings are insert-only, so
    /// this grows with every committed append whatever its timestamp.
    async fn reading_count(&self, meter: Uuid) -> StoreResult<u64>;

    /// Volume summed over several meters for `from <= recorded_at < until`.
    async fn total_volume(
        &self,
        meters: &[Uuid],
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<f64>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: Alert) -> StoreResult<Alert>;

    /// The newest unresolved alert of a type for a meter.
    async fn find_open(&self, meter: Uuid, alert_type: AlertType) -> StoreResult<Option<Alert>>;

    /// Unresolved alerts across all meters of an owner, newest first.
    async fn active_for_owner(&self, owner: AccountId) -> StoreResult<Vec<Alert>>;

    /// Resolve the open alerts among `ids` that belong to `owner`'s meters.
    /// Returns how many transitioned.
    async fn resolve(&self, owner: AccountId, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<u64>;
}

/// Bound a storage future by `limit`.
///
/// # Errors
///
/// Returns `StoreError::Timeout` if the future does not finish in time, or the
/// future's own error.
pub async fn deadline<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_surfaces_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(1)
        };
        let result = deadline(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn deadline_passes_through_results() {
        let fast = async { Ok::<_, StoreError>(7) };
        assert_eq!(deadline(Duration::from_secs(1), fast).await.ok(), Some(7));
    }
}
