use moka::future::Cache;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::Aggregator;
use crate::alerts::AlertManager;
use crate::config::Config;
use crate::detection::DetectionEngine;
use crate::ingest::IngestionService;
use crate::store::{AlertStore, DatabaseStore, MemoryStore, MeterDirectory, ReadingStore};

/// Cached response with metadata for freshness checking
#[derive(Clone)]
pub struct CachedResponse {
    pub data: Arc<Vec<u8>>,
    /// Readings stored for the covered meters when the response was computed
    pub revision: u64,
}

/// Cache for API responses. Key is request params, value is serialized response + metadata.
/// Weighted by byte size to enforce memory limit.
pub type ResponseCache = Cache<String, CachedResponse>;

/// The three storage seams, all served by one backend.
#[derive(Clone)]
pub struct Backend {
    pub meters: Arc<dyn MeterDirectory>,
    pub readings: Arc<dyn ReadingStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Backend {
    pub fn database(db: DatabaseConnection) -> Self {
        let store = Arc::new(DatabaseStore::new(db));
        Self {
            meters: store.clone(),
            readings: store.clone(),
            alerts: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            meters: store.clone(),
            readings: store.clone(),
            alerts: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub meters: Arc<dyn MeterDirectory>,
    pub readings: Arc<dyn ReadingStore>,
    pub ingestion: IngestionService,
    pub aggregator: Aggregator,
    pub alerts: AlertManager,
    pub response_cache: ResponseCache,
}

impl AppState {
    pub fn new(backend: Backend, config: Config) -> Self {
        let timeout = config.storage_timeout();

        // Cache weighted by byte size, not entry count
        let cache: ResponseCache = Cache::builder()
            .weigher(|_key: &String, value: &CachedResponse| -> u32 {
                value.data.len().try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(config.cache_max_bytes)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();

        let alerts = AlertManager::new(backend.alerts, config.alert_dedup_open, timeout);
        let engine = Arc::new(DetectionEngine::from_config(&config));
        let ingestion = IngestionService::new(
            backend.meters.clone(),
            backend.readings.clone(),
            alerts.clone(),
            engine,
            config.reject_inactive_meters,
            timeout,
        );
        let aggregator = Aggregator::new(backend.readings.clone(), config.bucket_utc_offset, timeout);

        Self {
            config: Arc::new(config),
            meters: backend.meters,
            readings: backend.readings,
            ingestion,
            aggregator,
            alerts,
            response_cache: cache,
        }
    }
}
