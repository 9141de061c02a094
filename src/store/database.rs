use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, sea_query::{Expr, Query},
};
use uuid::Uuid;

use super::{AlertStore, MeterDirectory, ReadingStore, StoreResult};
use crate::entity::{alerts, meters, readings};
use crate::model::{
    AccountId, Alert, AlertType, Meter, MeterType, NewReading, SortOrder, StoredReading,
};

/// Postgres backend built on the `migration` schema.
#[derive(Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<meters::Model> for Meter {
    fn from(m: meters::Model) -> Self {
        Self {
            id: m.id,
            meter_id: m.meter_id,
            name: m.name,
            meter_type: MeterType::parse(&m.meter_type),
            location: m.location,
            installation_date: m.installation_date,
            is_active: m.is_active,
            owner: AccountId(m.owner_id),
            created_at: m.created_at.with_timezone(&Utc),
        }
    }
}

impl From<readings::Model> for StoredReading {
    fn from(r: readings::Model) -> Self {
        Self {
            id: r.id,
            meter_id: r.meter_id,
            recorded_at: r.recorded_at.with_timezone(&Utc),
            volume: r.volume,
            flow_rate: r.flow_rate,
            temperature: r.temperature,
            is_leak: r.is_leak,
        }
    }
}

impl From<alerts::Model> for Alert {
    fn from(a: alerts::Model) -> Self {
        Self {
            id: a.id,
            meter_id: a.meter_id,
            alert_type: AlertType::parse(&a.alert_type),
            message: a.message,
            is_resolved: a.is_resolved,
            created_at: a.created_at.with_timezone(&Utc),
            resolved_at: a.resolved_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[async_trait]
impl MeterDirectory for DatabaseStore {
    async fn find_owned(&self, owner: AccountId, meter_id: &str) -> StoreResult<Option<Meter>> {
        let meter = meters::Entity::find()
            .filter(meters::Column::OwnerId.eq(owner.0))
            .filter(meters::Column::MeterId.eq(meter_id))
            .one(&self.db)
            .await?;
        Ok(meter.map(Meter::from))
    }

    async fn list_owned(&self, owner: AccountId) -> StoreResult<Vec<Meter>> {
        let meters = meters::Entity::find()
            .filter(meters::Column::OwnerId.eq(owner.0))
            .order_by_desc(meters::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(meters.into_iter().map(Meter::from).collect())
    }
}

#[async_trait]
impl ReadingStore for DatabaseStore {
    async fn append(&self, reading: NewReading) -> StoreResult<StoredReading> {
        let recorded_at = reading.recorded_at.unwrap_or_else(Utc::now);
        let row = readings::ActiveModel {
            meter_id: Set(reading.meter_id),
            recorded_at: Set(recorded_at.fixed_offset()),
            volume: Set(reading.volume),
            flow_rate: Set(reading.flow_rate),
            temperature: Set(reading.temperature),
            is_leak: Set(reading.is_leak),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn query_range(
        &self,
        meter: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        order: SortOrder,
    ) -> StoreResult<Vec<StoredReading>> {
        let query = readings::Entity::find()
            .filter(readings::Column::MeterId.eq(meter))
            .filter(readings::Column::RecordedAt.gte(from.fixed_offset()))
            .filter(readings::Column::RecordedAt.lte(to.fixed_offset()));

        let query = match order {
            SortOrder::Ascending => query
                .order_by_asc(readings::Column::RecordedAt)
                .order_by_asc(readings::Column::Id),
            SortOrder::Descending => query
                .order_by_desc(readings::Column::RecordedAt)
                .order_by_desc(readings::Column::Id),
        };

        let rows = query.all(&self.db).await?;
        Ok(rows.into_iter().map(StoredReading::from).collect())
    }

    async fn recent(&self, meter: Uuid, limit: u64) -> StoreResult<Vec<StoredReading>> {
        self.recent_across(&[meter], limit).await
    }

    async fn recent_across(&self, meters: &[Uuid], limit: u64) -> StoreResult<Vec<StoredReading>> {
        if meters.is_empty() {
            return Ok(Vec::new());
        }
        let rows = readings::Entity::find()
            .filter(readings::Column::MeterId.is_in(meters.iter().copied()))
            .order_by_desc(readings::Column::RecordedAt)
            .order_by_desc(readings::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(StoredReading::from).collect())
    }

    async fn reading_count(&self, meter: Uuid) -> StoreResult<u64> {
        let count = readings::Entity::find()
            .filter(readings::Column::MeterId.eq(meter))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn total_volume(
        &self,
        meters: &[Uuid],
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<f64> {
        if meters.is_empty() {
            return Ok(0.0);
        }
        // SUM over no rows is NULL
        let total: Option<Option<f64>> = readings::Entity::find()
            .select_only()
            .column_as(readings::Column::Volume.sum(), "total")
            .filter(readings::Column::MeterId.is_in(meters.iter().copied()))
            .filter(readings::Column::RecordedAt.gte(from.fixed_offset()))
            .filter(readings::Column::RecordedAt.lt(until.fixed_offset()))
            .into_tuple()
            .one(&self.db)
            .await?;
        Ok(total.flatten().unwrap_or(0.0))
    }
}

#[async_trait]
impl AlertStore for DatabaseStore {
    async fn insert(&self, alert: Alert) -> StoreResult<Alert> {
        let row = alerts::ActiveModel {
            id: Set(alert.id),
            meter_id: Set(alert.meter_id),
            alert_type: Set(alert.alert_type.as_str().to_string()),
            message: Set(alert.message),
            is_resolved: Set(alert.is_resolved),
            created_at: Set(alert.created_at.fixed_offset()),
            resolved_at: Set(alert.resolved_at.map(|t| t.fixed_offset())),
        }
        .insert(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn find_open(&self, meter: Uuid, alert_type: AlertType) -> StoreResult<Option<Alert>> {
        let alert = alerts::Entity::find()
            .filter(alerts::Column::MeterId.eq(meter))
            .filter(alerts::Column::AlertType.eq(alert_type.as_str()))
            .filter(alerts::Column::IsResolved.eq(false))
            .order_by_desc(alerts::Column::CreatedAt)
            .one(&self.db)
            .await?;
        Ok(alert.map(Alert::from))
    }

    async fn active_for_owner(&self, owner: AccountId) -> StoreResult<Vec<Alert>> {
        let rows = alerts::Entity::find()
            .inner_join(meters::Entity)
            .filter(meters::Column::OwnerId.eq(owner.0))
            .filter(alerts::Column::IsResolved.eq(false))
            .order_by_desc(alerts::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Alert::from).collect())
    }

    async fn resolve(&self, owner: AccountId, ids: &[Uuid], at: DateTime<Utc>) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let owned_meters = Query::select()
            .column(meters::Column::Id)
            .from(meters::Entity)
            .and_where(meters::Column::OwnerId.eq(owner.0))
            .to_owned();

        // The is_resolved filter keeps already-resolved rows (and their resolved_at) untouched
        let result = alerts::Entity::update_many()
            .col_expr(alerts::Column::IsResolved, Expr::value(true))
            .col_expr(alerts::Column::ResolvedAt, Expr::value(at.fixed_offset()))
            .filter(alerts::Column::Id.is_in(ids.iter().copied()))
            .filter(alerts::Column::IsResolved.eq(false))
            .filter(alerts::Column::MeterId.in_subquery(owned_meters))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
