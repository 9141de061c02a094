pub mod alerts;
pub mod cache;
pub mod dashboard;
pub mod health;
pub mod identity;
mod rate_limit;
pub mod readings;
pub mod usage;

use axum::{
    Router,
    extract::{Query, rejection::QueryRejection},
    routing::{get, post},
};
use std::sync::Arc;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};

use rate_limit::AccountOrIpKeyExtractor;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::model::{AccountId, Meter};
use crate::store::deadline;

/// Resolve a device meter identifier among the caller's meters.
///
/// Meters of other accounts are reported as not found.
pub async fn resolve_meter(state: &AppState, owner: AccountId, meter_id: &str) -> AppResult<Meter> {
    deadline(
        state.config.storage_timeout(),
        state.meters.find_owned(owner, meter_id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Meter '{meter_id}' not found")))
}

/// Unwrap query parameters, reporting malformed ones as invalid input.
pub(crate) fn query_input<T>(query: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    query
        .map(|Query(q)| q)
        .map_err(|e| AppError::InvalidInput(e.body_text()))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        readings::ingest_reading,
        readings::get_meter_readings,
        readings::get_recent_readings,
        usage::get_meter_usage,
        usage::get_meter_summary,
        dashboard::get_dashboard,
        alerts::list_active_alerts,
        alerts::resolve_alerts,
    ),
    components(
        schemas(
            health::HealthResponse,
            crate::validator::RawReading,
            crate::ingest::IngestStatus,
            crate::model::Meter,
            crate::model::StoredReading,
            crate::model::Alert,
            crate::aggregator::DailyTotal,
            crate::aggregator::HourlyTotal,
            readings::IngestResponse,
            readings::ReadingsResponse,
            usage::Usage,
            usage::UsageResponse,
            usage::MeterSummary,
            dashboard::DashboardReading,
            dashboard::DashboardResponse,
            alerts::AlertResponse,
            alerts::ResolveRequest,
            alerts::ResolveResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "readings", description = "Reading ingestion and raw readings"),
        (name = "usage", description = "Aggregated consumption"),
        (name = "dashboard", description = "Account overview"),
        (name = "alerts", description = "Leak and usage alerts"),
    ),
    info(
        title = "Flowguard API",
        description = "Water meter telemetry ingestion, aggregation and leak detection",
        version = "0.1.0"
    )
)]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    if config.disable_rate_limiting {
        tracing::warn!("Rate limiting DISABLED");
    } else {
        tracing::info!(
            ingest_rate = %format!("{}/s burst {}", config.rate_limit_ingest_per_second, config.rate_limit_ingest_burst),
            query_rate = %format!("{}/s burst {}", config.rate_limit_query_per_second, config.rate_limit_query_burst),
            "Rate limiting configured"
        );
    }

    // Base routes without rate limiting
    let ingest_routes_base = Router::new().route("/readings", post(readings::ingest_reading));

    let query_routes_base = Router::new()
        .route("/meters/{meter_id}/readings", get(readings::get_meter_readings))
        .route(
            "/meters/{meter_id}/readings/recent",
            get(readings::get_recent_readings),
        )
        .route(
            "/meters/{meter_id}/usage/{resolution}",
            get(usage::get_meter_usage),
        )
        .route("/meters/{meter_id}/summary", get(usage::get_meter_summary))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/alerts/active", get(alerts::list_active_alerts))
        .route("/alerts/resolve", post(alerts::resolve_alerts));

    // Combine API routes, conditionally applying rate limiting
    let api_routes = if config.disable_rate_limiting {
        Router::new()
            .merge(ingest_routes_base)
            .merge(query_routes_base)
    } else {
        let ingest_limiter = GovernorConfigBuilder::default()
            .key_extractor(AccountOrIpKeyExtractor)
            .per_second(config.rate_limit_ingest_per_second)
            .burst_size(config.rate_limit_ingest_burst)
            .finish();

        let query_limiter = GovernorConfigBuilder::default()
            .key_extractor(AccountOrIpKeyExtractor)
            .per_second(config.rate_limit_query_per_second)
            .burst_size(config.rate_limit_query_burst)
            .finish();

        match (ingest_limiter, query_limiter) {
            (Some(ingest), Some(query)) => Router::new()
                .merge(ingest_routes_base.layer(GovernorLayer {
                    config: Arc::new(ingest),
                }))
                .merge(query_routes_base.layer(GovernorLayer {
                    config: Arc::new(query),
                })),
            _ => {
                tracing::error!("Invalid rate limit settings, serving without rate limiting");
                Router::new()
                    .merge(ingest_routes_base)
                    .merge(query_routes_base)
            }
        }
    }
    .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB body limit

    // Health check routes (NO rate limiting)
    let health_routes = Router::new().route("/healthz", get(health::healthz));

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
