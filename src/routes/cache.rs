//! Response caching for usage endpoints.
//!
//! | Window | Invalidation |
//! |--------|--------------|
//! | Closed (ends before today) | TTL only |
//! | Open (includes today) | TTL + freshness check against the stored reading count |
//!
//! Readings are insert-only, so the per-meter count moves with every committed
//! append, including late appends stamped earlier than readings already
//! cached. An open-window entry is dropped as soon as the count differs.

use axum::{
    http::{HeaderValue, header},
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::{AppState, CachedResponse};
use crate::error::{AppError, AppResult};
use crate::store::deadline;

/// Build a cache key from a prefix and components.
///
/// Components are joined with `:`. Empty components are kept so different
/// queries produce different keys.
pub fn cache_key(prefix: &str, components: &[&str]) -> String {
    let mut key = prefix.to_string();
    for c in components {
        key.push(':');
        key.push_str(c);
    }
    key
}

/// Total readings stored across `meters`.
pub async fn revision(state: &AppState, meters: &[Uuid]) -> AppResult<u64> {
    let timeout = state.config.storage_timeout();
    let mut total = 0;
    for meter in meters {
        total += deadline(timeout, state.readings.reading_count(*meter)).await?;
    }
    Ok(total)
}

/// Look up a cached response.
///
/// Closed windows are returned as-is. Open windows are dropped when the
/// reading count changed since the entry was stored. A failed freshness check
/// counts as a miss.
pub async fn get_cached(
    state: &AppState,
    cache_key: &str,
    meters: &[Uuid],
    window_closed: bool,
) -> Option<Arc<Vec<u8>>> {
    let cached = state.response_cache.get(cache_key).await?;

    if !window_closed {
        match revision(state, meters).await {
            Ok(current) if current != cached.revision => {
                tracing::debug!(
                    cache_key = %cache_key,
                    cached_revision = cached.revision,
                    current_revision = current,
                    "cache_stale"
                );
                state.response_cache.invalidate(cache_key).await;
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(cache_key = %cache_key, error = %e, "cache_freshness_check_failed");
                return None;
            }
        }
    }

    tracing::debug!(cache_key = %cache_key, "cache_hit");
    Some(cached.data.clone())
}

pub async fn store_cached(
    state: &AppState,
    cache_key: String,
    data: Vec<u8>,
    revision: u64,
) {
    let size = data.len();
    state
        .response_cache
        .insert(
            cache_key.clone(),
            CachedResponse {
                data: Arc::new(data),
                revision,
            },
        )
        .await;

    tracing::debug!(
        cache_key = %cache_key,
        size_bytes = size,
        revision,
        "cache_stored"
    );
}

/// JSON response carrying `X-Cache: HIT` or `X-Cache: MISS`.
pub fn json_response(data: Vec<u8>, cache_hit: bool) -> AppResult<Response> {
    let cache_header = if cache_hit { "HIT" } else { "MISS" };
    Response::builder()
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .header("X-Cache", HeaderValue::from_static(cache_header))
        .body(axum::body::Body::from(data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Serialize a response, store it in the cache, then return it.
pub async fn cache_and_respond<T: Serialize>(
    state: &AppState,
    cache_key: String,
    response: &T,
    revision: u64,
) -> AppResult<Response> {
    let json_bytes = serde_json::to_vec(response).map_err(|e| AppError::Internal(e.to_string()))?;

    store_cached(state, cache_key, json_bytes.clone(), revision).await;

    json_response(json_bytes, false)
}
