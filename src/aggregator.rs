//! Windowed usage statistics computed from the reading store.
//!
//! Calendar days and hours are taken in one configured UTC offset rather than
//! the server's locale. Every window is closed on both ends, and buckets
//! without readings are omitted rather than zero-filled.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{SortOrder, StoredReading};
use crate::store::{ReadingStore, deadline};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyTotal {
    pub day: NaiveDate,
    /// Liters
    pub total_volume: f64,
    /// Liters per minute
    pub avg_flow_rate: f64,
    pub reading_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HourlyTotal {
    /// Start of the hour in the bucketing offset
    #[schema(value_type = String, format = DateTime)]
    pub hour: DateTime<FixedOffset>,
    /// Liters
    pub total_volume: f64,
    pub reading_count: u64,
}

#[derive(Default)]
struct Bucket {
    volume: f64,
    flow_rate: f64,
    count: u64,
}

impl Bucket {
    fn add(&mut self, r: &StoredReading) {
        self.volume += r.volume;
        self.flow_rate += r.flow_rate;
        self.count += 1;
    }
}

#[derive(Clone)]
pub struct Aggregator {
    readings: Arc<dyn ReadingStore>,
    offset: FixedOffset,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(readings: Arc<dyn ReadingStore>, offset: FixedOffset, timeout: Duration) -> Self {
        Self {
            readings,
            offset,
            timeout,
        }
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current calendar date in the bucketing offset.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// Calendar date of an instant in the bucketing offset.
    #[must_use]
    pub fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.offset).date_naive()
    }

    /// The instant a local wall-clock time denotes.
    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let shift = TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        local.checked_sub_signed(shift).unwrap_or(local).and_utc()
    }

    fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day.and_time(NaiveTime::MIN))
    }

    /// Start of `from` and start of the day after `to`, as instants.
    fn window(&self, from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.day_start(from);
        let end = to
            .succ_opt()
            .map_or(DateTime::<Utc>::MAX_UTC, |next| self.day_start(next));
        (start, end)
    }

    /// All readings whose local date falls in `[from, to]`, ascending.
    async fn readings_between(
        &self,
        meter: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<StoredReading>> {
        let (start, end) = self.window(from, to);

        let rows = deadline(
            self.timeout,
            self.readings
                .query_range(meter, start, end, SortOrder::Ascending),
        )
        .await?;

        // The store range is closed, so a reading exactly at the next midnight is dropped here
        Ok(rows
            .into_iter()
            .filter(|r| self.local_date(r.recorded_at) <= to)
            .collect())
    }

    /// Per-day volume sum and mean flow rate for `from..=to`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `from` is after `to`; store failures otherwise.
    pub async fn daily_totals(
        &self,
        meter: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<DailyTotal>> {
        if from > to {
            return Err(AppError::InvalidInput(
                "from date must not be after to date".to_string(),
            ));
        }

        let mut buckets: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
        for r in self.readings_between(meter, from, to).await? {
            buckets.entry(self.local_date(r.recorded_at)).or_default().add(&r);
        }

        Ok(buckets
            .into_iter()
            .map(|(day, b)| DailyTotal {
                day,
                total_volume: b.volume,
                avg_flow_rate: b.flow_rate / b.count as f64,
                reading_count: b.count,
            })
            .collect())
    }

    /// Per-hour volume sums for one calendar day.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn hourly_totals(&self, meter: Uuid, date: NaiveDate) -> AppResult<Vec<HourlyTotal>> {
        let mut buckets: BTreeMap<u32, Bucket> = BTreeMap::new();
        for r in self.readings_between(meter, date, date).await? {
            let hour = r.recorded_at.with_timezone(&self.offset).hour();
            buckets.entry(hour).or_default().add(&r);
        }

        Ok(buckets
            .into_iter()
            .filter_map(|(hour, b)| {
                let start = date.and_hms_opt(hour, 0, 0)?;
                Some(HourlyTotal {
                    hour: self.local_to_utc(start).with_timezone(&self.offset),
                    total_volume: b.volume,
                    reading_count: b.count,
                })
            })
            .collect())
    }

    /// Volume from the first of `as_of`'s month through `as_of`, inclusive.
    /// Zero when there are no readings.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn month_to_date_volume(&self, meter: Uuid, as_of: NaiveDate) -> AppResult<f64> {
        self.combined_month_to_date(&[meter], as_of).await
    }

    /// Month-to-date volume summed over several meters, in one store call.
    ///
    /// # Errors
    ///
    /// Store failures and timeouts.
    pub async fn combined_month_to_date(&self, meters: &[Uuid], as_of: NaiveDate) -> AppResult<f64> {
        let month_start = as_of.with_day(1).unwrap_or(as_of);
        let (start, end) = self.window(month_start, as_of);
        let total = deadline(self.timeout, self.readings.total_volume(meters, start, end)).await?;
        // Normalise -0.0 so an empty month reports a plain zero
        Ok(total + 0.0)
    }
}
