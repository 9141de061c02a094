//! In-process backend.
//!
//! Each meter's series sits behind its own mutex, so appends to different
//! meters never contend; the map-level lock is only taken for writing when a
//! meter's first reading creates its series. Within a series rows are kept
//! sorted by `(recorded_at, id)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{AlertStore, MeterDirectory, ReadingStore, StoreError, StoreResult};
use crate::model::{AccountId, Alert, AlertType, Meter, NewReading, SortOrder, StoredReading};

type Series = Arc<Mutex<Vec<StoredReading>>>;

#[derive(Default)]
pub struct MemoryStore {
    meters: RwLock<HashMap<Uuid, Meter>>,
    series: RwLock<HashMap<Uuid, Series>>,
    alerts: RwLock<Vec<Alert>>,
    last_reading_id: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a meter. Registration normally happens outside this service.
    pub async fn register_meter(&self, meter: Meter) {
        self.meters.write().await.insert(meter.id, meter);
    }

    /// Delete a meter together with its readings and alerts.
    pub async fn remove_meter(&self, id: Uuid) -> bool {
        let mut meters = self.meters.write().await;
        let Some(meter) = meters.remove(&id) else {
            return false;
        };
        self.series.write().await.remove(&id);
        self.alerts.write().await.retain(|a| a.meter_id != id);
        tracing::debug!(meter_id = %meter.meter_id, "meter_removed");
        true
    }

    async fn series_for(&self, meter: Uuid) -> Series {
        if let Some(series) = self.series.read().await.get(&meter) {
            return series.clone();
        }
        self.series
            .write()
            .await
            .entry(meter)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    async fn existing_series(&self, meter: Uuid) -> Option<Series> {
        self.series.read().await.get(&meter).cloned()
    }

    async fn owned_meter_ids(&self, owner: AccountId) -> HashSet<Uuid> {
        self.meters
            .read()
            .await
            .values()
            .filter(|m| m.owner == owner)
            .map(|m| m.id)
            .collect()
    }
}

#[async_trait]
impl MeterDirectory for MemoryStore {
    async fn find_owned(&self, owner: AccountId, meter_id: &str) -> StoreResult<Option<Meter>> {
        Ok(self
            .meters
            .read()
            .await
            .values()
            .find(|m| m.owner == owner && m.meter_id == meter_id)
            .cloned())
    }

    async fn list_owned(&self, owner: AccountId) -> StoreResult<Vec<Meter>> {
        let mut meters: Vec<Meter> = self
            .meters
            .read()
            .await
            .values()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect();
        meters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(meters)
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn append(&self, reading: NewReading) -> StoreResult<StoredReading> {
        // Held until the row is in place so remove_meter cannot interleave
        let meters = self.meters.read().await;
        if !meters.contains_key(&reading.meter_id) {
            return Err(StoreError::MissingMeter(reading.meter_id));
        }

        let series = self.series_for(reading.meter_id).await;
        let mut rows = series.lock().await;

        // Id and default timestamp are drawn under the series lock so they follow per-meter arrival order
        let stored = StoredReading {
            id: self.last_reading_id.fetch_add(1, Ordering::Relaxed) + 1,
            meter_id: reading.meter_id,
            recorded_at: reading.recorded_at.unwrap_or_else(Utc::now),
            volume: reading.volume,
            flow_rate: reading.flow_rate,
            temperature: reading.temperature,
            is_leak: reading.is_leak,
        };

        let pos = rows.partition_point(|r| r.recorded_at <= stored.recorded_at);
        rows.insert(pos, stored.clone());
        drop(meters);
        Ok(stored)
    }

    async fn query_range(
        &self,
        meter: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        order: SortOrder,
    ) -> StoreResult<Vec<StoredReading>> {
        let Some(series) = self.existing_series(meter).await else {
            return Ok(Vec::new());
        };
        let rows = series.lock().await;
        let start = rows.partition_point(|r| r.recorded_at < from);
        let end = rows.partition_point(|r| r.recorded_at <= to);
        if start >= end {
            return Ok(Vec::new());
        }

        let mut out = rows[start..end].to_vec();
        if order == SortOrder::Descending {
            out.reverse();
        }
        Ok(out)
    }

    async fn recent(&self, meter: Uuid, limit: u64) -> StoreResult<Vec<StoredReading>> {
        let Some(series) = self.existing_series(meter).await else {
            return Ok(Vec::new());
        };
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let rows = series.lock().await;
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }

    async fn recent_across(&self, meters: &[Uuid], limit: u64) -> StoreResult<Vec<StoredReading>> {
        let mut merged = Vec::new();
        for meter in meters {
            merged.extend(self.recent(*meter, limit).await?);
        }
        merged.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        merged.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(merged)
    }

    async fn reading_count(&self, meter: Uuid) -> StoreResult<u64> {
        let Some(series) = self.existing_series(meter).await else {
            return Ok(0);
        };
        Ok(series.lock().await.len() as u64)
    }

    async fn total_volume(
        &self,
        meters: &[Uuid],
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<f64> {
        let mut total = 0.0;
        for meter in meters {
            let Some(series) = self.existing_series(*meter).await else {
                continue;
            };
            let rows = series.lock().await;
            let start = rows.partition_point(|r| r.recorded_at < from);
            let end = rows.partition_point(|r| r.recorded_at < until);
            total = rows
                .get(start..end)
                .unwrap_or_default()
                .iter()
                .fold(total, |acc, r| acc + r.volume);
        }
        Ok(total)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert(&self, alert: Alert) -> StoreResult<Alert> {
        let meters = self.meters.read().await;
        if !meters.contains_key(&alert.meter_id) {
            return Err(StoreError::MissingMeter(alert.meter_id));
        }
        self.alerts.write().await.push(alert.clone());
        drop(meters);
        Ok(alert)
    }

    async fn find_open(&self, meter: Uuid, alert_type: AlertType) -> StoreResult<Option<Alert>> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .rev()
            .find(|a| a.meter_id == meter && a.alert_type == alert_type && !a.is_resolved)
            .cloned())
    }

    async fn active_for_owner(&self, owner: AccountId) -> StoreResult<Vec<Alert>> {
        let owned = self.owned_meter_ids(owner).await;
        // Walk newest insertions first so the stable sort keeps them ahead on equal timestamps
        let mut active: Vec<Alert> = self
            .alerts
            .read()
            .await
            .iter()
            .rev()
            .filter(|a| !a.is_resolved && owned.contains(&a.meter_id))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn resolve(&self, owner: AccountId, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<u64> {
        let owned = self.owned_meter_ids(owner).await;
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut resolved = 0;
        for alert in self.alerts.write().await.iter_mut() {
            if wanted.contains(&alert.id) && owned.contains(&alert.meter_id) && alert.resolve(at) {
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MeterType;
    use chrono::{NaiveDate, TimeZone};

    fn meter(owner: i64, meter_id: &str) -> Meter {
        Meter {
            id: Uuid::new_v4(),
            meter_id: meter_id.to_string(),
            name: format!("Meter {meter_id}"),
            meter_type: MeterType::Digital,
            location: None,
            installation_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            is_active: true,
            owner: AccountId(owner),
            created_at: Utc::now(),
        }
    }

    fn reading(meter: Uuid, at: Option<DateTime<Utc>>, volume: f64) -> NewReading {
        NewReading {
            meter_id: meter,
            recorded_at: at,
            volume,
            flow_rate: 1.0,
            temperature: None,
            is_leak: false,
        }
    }

    #[tokio::test]
    async fn out_of_order_timestamps_are_kept_sorted() {
        let store = MemoryStore::new();
        let m = meter(1, "M1");
        store.register_meter(m.clone()).await;

        let t = |h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap();
        store.append(reading(m.id, Some(t(5)), 1.0)).await.unwrap();
        store.append(reading(m.id, Some(t(2)), 2.0)).await.unwrap();
        store.append(reading(m.id, Some(t(5)), 3.0)).await.unwrap();

        let rows = store
            .query_range(m.id, t(0), t(23), SortOrder::Ascending)
            .await
            .unwrap();
        let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();
        assert_eq!(volumes, vec![2.0, 1.0, 3.0]);
    }

    #[tokio::test]
    async fn range_is_closed_on_both_ends() {
        let store = MemoryStore::new();
        let m = meter(1, "M1");
        store.register_meter(m.clone()).await;

        let t = |h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap();
        for h in [1, 2, 3, 4] {
            store.append(reading(m.id, Some(t(h)), f64::from(h))).await.unwrap();
        }

        let rows = store
            .query_range(m.id, t(2), t(3), SortOrder::Descending)
            .await
            .unwrap();
        let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();
        assert_eq!(volumes, vec![3.0, 2.0]);

        let none = store
            .query_range(m.id, t(3), t(2), SortOrder::Ascending)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn append_rejects_unknown_meter() {
        let store = MemoryStore::new();
        let err = store.append(reading(Uuid::new_v4(), None, 1.0)).await;
        assert!(matches!(err, Err(StoreError::MissingMeter(_))));
    }

    #[tokio::test]
    async fn removing_a_meter_cascades() {
        let store = MemoryStore::new();
        let m = meter(1, "M1");
        store.register_meter(m.clone()).await;
        store.append(reading(m.id, None, 1.0)).await.unwrap();
        store
            .insert(Alert::open(m.id, AlertType::Leak, "leak".into(), Utc::now()))
            .await
            .unwrap();

        assert!(store.remove_meter(m.id).await);
        assert!(store.recent(m.id, 10).await.unwrap().is_empty());
        assert!(store.active_for_owner(AccountId(1)).await.unwrap().is_empty());
        assert!(!store.remove_meter(m.id).await);
    }

    #[tokio::test]
    async fn concurrent_appends_to_one_meter_all_land() {
        let store = Arc::new(MemoryStore::new());
        let m = meter(1, "M1");
        store.register_meter(m.clone()).await;

        let meter_id = m.id;
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(reading(meter_id, None, f64::from(i))).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let rows = store.recent(m.id, 100).await.unwrap();
        assert_eq!(rows.len(), 32);
        assert!(rows.windows(2).all(|w| {
            (w[0].recorded_at, w[0].id) > (w[1].recorded_at, w[1].id)
        }));
    }
    #[tokio::test]
    async fn append_racing_removal_leaves_no_orphans() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..50 {
            let m = meter(1, "M1");
            store.register_meter(m.clone()).await;

            let meter_id = m.id;
            let appender = {
                let store = store.clone();
                tokio::spawn(async move { store.append(reading(meter_id, None, 1.0)).await })
            };
            let remover = {
                let store = store.clone();
                tokio::spawn(async move { store.remove_meter(meter_id).await })
            };
            let appended = appender.await.unwrap();
            assert!(remover.await.unwrap());

            assert!(appended.is_ok() || matches!(appended, Err(StoreError::MissingMeter(_))));
            assert_eq!(store.reading_count(meter_id).await.unwrap(), 0);
            assert!(store.recent(meter_id, 10).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn reading_count_grows_regardless_of_timestamp() {
        let store = MemoryStore::new();
        let m = meter(1, "M1");
        store.register_meter(m.clone()).await;
        assert_eq!(store.reading_count(m.id).await.unwrap(), 0);

        let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        store.append(reading(m.id, Some(t), 1.0)).await.unwrap();
        store
            .append(reading(m.id, Some(t - chrono::Duration::milliseconds(5)), 10.0))
            .await
            .unwrap();

        assert_eq!(store.reading_count(m.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn total_volume_is_half_open_and_spans_meters() {
        let store = MemoryStore::new();
        let a = meter(1, "A");
        let b = meter(1, "B");
        store.register_meter(a.clone()).await;
        store.register_meter(b.clone()).await;

        let t = |h| Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap();
        store.append(reading(a.id, Some(t(1)), 1.0)).await.unwrap();
        store.append(reading(a.id, Some(t(2)), 2.0)).await.unwrap();
        store.append(reading(b.id, Some(t(1)), 4.0)).await.unwrap();
        store.append(reading(b.id, Some(t(3)), 8.0)).await.unwrap();

        let total = store.total_volume(&[a.id, b.id], t(1), t(3)).await.unwrap();
        assert!((total - 7.0).abs() < 1e-9);

        let empty = store.total_volume(&[a.id], t(5), t(6)).await.unwrap();
        assert_eq!(empty, 0.0);
        assert!(!empty.is_sign_negative());
    }
}
