//! Usage aggregation over the in-memory reading store.
//!
//! Run with: cargo test --test aggregation

mod support;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use flowguard::aggregator::Aggregator;
use flowguard::error::ErrorKind;
use flowguard::model::NewReading;
use flowguard::store::{MemoryStore, ReadingStore};

use support::{OWNER, meter, store_with};

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn put(store: &MemoryStore, meter: Uuid, at: DateTime<Utc>, volume: f64, flow_rate: f64) {
    store
        .append(NewReading {
            meter_id: meter,
            recorded_at: Some(at),
            volume,
            flow_rate,
            temperature: None,
            is_leak: false,
        })
        .await
        .unwrap();
}

fn aggregator(store: Arc<MemoryStore>, offset: FixedOffset) -> Aggregator {
    Aggregator::new(store, offset, Duration::from_secs(2))
}

#[tokio::test]
async fn daily_totals_sum_volume_and_average_flow() {
    let m = meter(OWNER, "M1");
    let store = store_with(&[m.clone()]).await;
    put(&store, m.id, utc(2026, 3, 2, 8, 0, 0), 2.0, 1.0).await;
    put(&store, m.id, utc(2026, 3, 2, 18, 30, 0), 3.5, 3.0).await;
    put(&store, m.id, utc(2026, 3, 4, 9, 0, 0), 1.25, 0.5).await;

    let agg = aggregator(store, FixedOffset::east_opt(0).unwrap());
    let days = agg
        .daily_totals(m.id, date(2026, 3, 1), date(2026, 3, 5))
        .await
        .unwrap();

    assert_eq!(days.len(), 2, "empty days are omitted");
    assert_eq!(days[0].day, date(2026, 3, 2));
    assert!((days[0].total_volume - 5.5).abs() < 1e-9);
    assert!((days[0].avg_flow_rate - 2.0).abs() < 1e-9);
    assert_eq!(days[0].reading_count, 2);
    assert_eq!(days[1].day, date(2026, 3, 4));
    assert!((days[1].total_volume - 1.25).abs() < 1e-9);
}

#[tokio::test]
async fn empty_range_yields_no_buckets_and_zero_volume() {
    let m = meter(OWNER, "M1");
    let store = store_with(&[m.clone()]).await;
    let agg = aggregator(store, FixedOffset::east_opt(0).unwrap());

    let days = agg
        .daily_totals(m.id, date(2026, 3, 1), date(2026, 3, 31))
        .await
        .unwrap();
    assert!(days.is_empty());

    let hours = agg.hourly_totals(m.id, date(2026, 3, 1)).await.unwrap();
    assert!(hours.is_empty());

    let mtd = agg.month_to_date_volume(m.id, date(2026, 3, 15)).await.unwrap();
    assert_eq!(mtd, 0.0);
    assert!(!mtd.is_sign_negative());
}

#[tokio::test]
async fn inverted_daily_range_is_invalid() {
    let m = meter(OWNER, "M1");
    let store = store_with(&[m.clone()]).await;
    let agg = aggregator(store, FixedOffset::east_opt(0).unwrap());

    let err = agg
        .daily_totals(m.id, date(2026, 3, 5), date(2026, 3, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn day_boundaries_are_inclusive_and_exclusive_of_next_midnight() {
    let m = meter(OWNER, "M1");
    let store = store_with(&[m.clone()]).await;
    put(&store, m.id, utc(2026, 3, 1, 23, 59, 59), 100.0, 0.0).await;
    put(&store, m.id, utc(2026, 3, 2, 0, 0, 0), 1.0, 0.0).await;
    put(&store, m.id, utc(2026, 3, 2, 23, 59, 59), 2.0, 0.0).await;
    put(&store, m.id, utc(2026, 3, 3, 0, 0, 0), 200.0, 0.0).await;

    let agg = aggregator(store, FixedOffset::east_opt(0).unwrap());
    let days = agg
        .daily_totals(m.id, date(2026, 3, 2), date(2026, 3, 2))
        .await
        .unwrap();

    assert_eq!(days.len(), 1);
    assert!((days[0].total_volume - 3.0).abs() < 1e-9);
    assert_eq!(days[0].reading_count, 2);
}

#[tokio::test]
async fn buckets_follow_the_configured_offset() {
    let m = meter(OWNER, "M1");
    let store = store_with(&[m.clone()]).await;
    // 01:30 local on March 2nd at +02:00
    put(&store, m.id, utc(2026, 3, 1, 23, 30, 0), 4.0, 1.0).await;
    // 12:10 local on March 2nd
    put(&store, m.id, utc(2026, 3, 2, 10, 10, 0), 1.0, 1.0).await;
    put(&store, m.id, utc(2026, 3, 2, 10, 50, 0), 2.0, 1.0).await;

    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    let agg = aggregator(store, offset);

    let days = agg
        .daily_totals(m.id, date(2026, 3, 1), date(2026, 3, 2))
        .await
        .unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].day, date(2026, 3, 2));
    assert!((days[0].total_volume - 7.0).abs() < 1e-9);

    let hours = agg.hourly_totals(m.id, date(2026, 3, 2)).await.unwrap();
    assert_eq!(hours.len(), 2);
    assert_eq!(hours[0].hour, offset.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap());
    assert!((hours[0].total_volume - 4.0).abs() < 1e-9);
    assert_eq!(hours[1].hour, offset.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
    assert!((hours[1].total_volume - 3.0).abs() < 1e-9);
    assert_eq!(hours[1].reading_count, 2);
}

#[tokio::test]
async fn month_to_date_spans_first_of_month_through_as_of() {
    let m = meter(OWNER, "M1");
    let store = store_with(&[m.clone()]).await;
    put(&store, m.id, utc(2026, 2, 28, 23, 59, 59), 50.0, 0.0).await;
    put(&store, m.id, utc(2026, 3, 1, 0, 0, 0), 1.5, 0.0).await;
    put(&store, m.id, utc(2026, 3, 10, 23, 0, 0), 2.5, 0.0).await;
    put(&store, m.id, utc(2026, 3, 11, 0, 0, 1), 70.0, 0.0).await;

    let agg = aggregator(store, FixedOffset::east_opt(0).unwrap());
    let mtd = agg.month_to_date_volume(m.id, date(2026, 3, 10)).await.unwrap();
    assert!((mtd - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn combined_month_to_date_sums_meters() {
    let a = meter(OWNER, "A");
    let b = meter(OWNER, "B");
    let store = store_with(&[a.clone(), b.clone()]).await;
    put(&store, a.id, utc(2026, 3, 3, 12, 0, 0), 10.0, 0.0).await;
    put(&store, b.id, utc(2026, 3, 4, 12, 0, 0), 5.0, 0.0).await;

    let agg = aggregator(store, FixedOffset::east_opt(0).unwrap());
    let total = agg
        .combined_month_to_date(&[a.id, b.id], date(2026, 3, 31))
        .await
        .unwrap();
    assert!((total - 15.0).abs() < 1e-9);

    let none = agg.combined_month_to_date(&[], date(2026, 3, 31)).await.unwrap();
    assert_eq!(none, 0.0);
}
