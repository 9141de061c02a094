use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Response,
};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::aggregator::{DailyTotal, HourlyTotal};
use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::model::{AccountId, Meter, StoredReading};
use crate::routes::{cache, query_input, resolve_meter};
use crate::store::deadline;

/// Maximum span of a daily usage query
const MAX_DAILY_RANGE_DAYS: u64 = 366;

/// Days covered by the daily series of a meter summary, today included
const SUMMARY_DAYS: u64 = 7;

const SUMMARY_RECENT_COUNT: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Daily,
    Hourly,
    MonthToDate,
}

impl Resolution {
    fn parse(s: &str) -> AppResult<Self> {
        match s {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "month-to-date" => Ok(Self::MonthToDate),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid resolution: {s}. Must be one of: daily, hourly, month-to-date"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Hourly => "hourly",
            Self::MonthToDate => "month-to-date",
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UsageQuery {
    /// First day of a daily series (default: six days before `to`)
    pub from: Option<NaiveDate>,
    /// Last day of a daily series (default: today)
    pub to: Option<NaiveDate>,
    /// Day of an hourly series (default: today)
    pub date: Option<NaiveDate>,
    /// Last day counted by month-to-date (default: today)
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "resolution", rename_all = "kebab-case")]
pub enum Usage {
    Daily {
        from: NaiveDate,
        to: NaiveDate,
        days: Vec<DailyTotal>,
    },
    Hourly {
        date: NaiveDate,
        /// Offset the hours are bucketed in, e.g. `+02:00`
        utc_offset: String,
        hours: Vec<HourlyTotal>,
    },
    MonthToDate {
        as_of: NaiveDate,
        /// Liters
        total_volume: f64,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    pub meter_id: String,
    #[serde(flatten)]
    pub usage: Usage,
}

/// Get aggregated usage for a meter
///
/// Daily and hourly buckets without readings are omitted. Calendar days are
/// taken in the configured bucketing offset.
#[utoipa::path(
    get,
    path = "/api/meters/{meter_id}/usage/{resolution}",
    params(
        ("meter_id" = String, Path, description = "Device meter identifier"),
        ("resolution" = String, Path, description = "daily, hourly or month-to-date"),
        ("X-Account-Id" = i64, Header, description = "Authenticated account"),
        UsageQuery
    ),
    responses(
        (status = 200, description = "Usage computed", body = UsageResponse),
        (status = 400, description = "Invalid resolution or dates"),
        (status = 404, description = "Meter not found"),
    ),
    tag = "usage"
)]
pub async fn get_meter_usage(
    State(state): State<AppState>,
    owner: AccountId,
    Path((meter_id, resolution)): Path<(String, String)>,
    query: Result<Query<UsageQuery>, QueryRejection>,
) -> AppResult<Response> {
    let resolution = Resolution::parse(&resolution)?;
    let query = query_input(query)?;
    let aggregator = &state.aggregator;
    let today = aggregator.today();

    let (from, to) = match resolution {
        Resolution::Daily => {
            let to = query.to.unwrap_or(today);
            let from = match query.from {
                Some(from) => from,
                None => to
                    .checked_sub_days(Days::new(SUMMARY_DAYS - 1))
                    .unwrap_or(to),
            };
            if from > to {
                return Err(AppError::InvalidInput(
                    "from date must not be after to date".to_string(),
                ));
            }
            if from
                .checked_add_days(Days::new(MAX_DAILY_RANGE_DAYS))
                .is_some_and(|limit| to >= limit)
            {
                return Err(AppError::InvalidInput(format!(
                    "date range exceeds maximum of {MAX_DAILY_RANGE_DAYS} days"
                )));
            }
            (from, to)
        }
        Resolution::Hourly => {
            let date = query.date.unwrap_or(today);
            (date, date)
        }
        Resolution::MonthToDate => {
            let as_of = query.as_of.unwrap_or(today);
            (as_of, as_of)
        }
    };

    let meter = resolve_meter(&state, owner, &meter_id).await?;

    let cache_key = cache::cache_key(
        "usage",
        &[
            &meter.id.to_string(),
            resolution.as_str(),
            &from.to_string(),
            &to.to_string(),
            &aggregator.offset().to_string(),
        ],
    );

    // Windows that ended before today cannot gain readings
    let window_closed = to < today;
    if let Some(cached) = cache::get_cached(&state, &cache_key, &[meter.id], window_closed).await {
        return cache::json_response((*cached).to_vec(), true);
    }

    // Taken before computing so a concurrent append marks the entry stale
    let revision = cache::revision(&state, &[meter.id]).await?;

    let usage = match resolution {
        Resolution::Daily => Usage::Daily {
            from,
            to,
            days: aggregator.daily_totals(meter.id, from, to).await?,
        },
        Resolution::Hourly => Usage::Hourly {
            date: from,
            utc_offset: aggregator.offset().to_string(),
            hours: aggregator.hourly_totals(meter.id, from).await?,
        },
        Resolution::MonthToDate => Usage::MonthToDate {
            as_of: to,
            total_volume: aggregator.month_to_date_volume(meter.id, to).await?,
        },
    };

    let response = UsageResponse {
        meter_id: meter.meter_id,
        usage,
    };

    cache::cache_and_respond(&state, cache_key, &response, revision).await
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeterSummary {
    pub meter: Meter,
    /// Today in the bucketing offset
    pub today: NaiveDate,
    /// Daily totals for the last seven days, today included
    pub daily: Vec<DailyTotal>,
    /// Hourly totals for today
    pub hourly: Vec<HourlyTotal>,
    /// Newest readings first
    pub recent: Vec<StoredReading>,
    /// Liters since the first of the month
    pub month_to_date_volume: f64,
}

/// Get a usage summary for one meter
#[utoipa::path(
    get,
    path = "/api/meters/{meter_id}/summary",
    params(
        ("meter_id" = String, Path, description = "Device meter identifier"),
        ("X-Account-Id" = i64, Header, description = "Authenticated account"),
    ),
    responses(
        (status = 200, description = "Summary computed", body = MeterSummary),
        (status = 404, description = "Meter not found"),
    ),
    tag = "usage"
)]
pub async fn get_meter_summary(
    State(state): State<AppState>,
    owner: AccountId,
    Path(meter_id): Path<String>,
) -> AppResult<Json<MeterSummary>> {
    let meter = resolve_meter(&state, owner, &meter_id).await?;
    let aggregator = &state.aggregator;
    let today = aggregator.today();
    let week_start = today
        .checked_sub_days(Days::new(SUMMARY_DAYS - 1))
        .unwrap_or(today);

    let daily = aggregator.daily_totals(meter.id, week_start, today).await?;
    let hourly = aggregator.hourly_totals(meter.id, today).await?;
    let month_to_date_volume = aggregator.month_to_date_volume(meter.id, today).await?;
    let recent = deadline(
        state.config.storage_timeout(),
        state.readings.recent(meter.id, SUMMARY_RECENT_COUNT),
    )
    .await?;

    Ok(Json(MeterSummary {
        meter,
        today,
        daily,
        hourly,
        recent,
        month_to_date_volume,
    }))
}
