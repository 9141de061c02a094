//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use flowguard::common::{AppState, Backend};
use flowguard::config::Config;
use flowguard::model::{AccountId, Meter, MeterType};
use flowguard::store::MemoryStore;
use flowguard::validator::RawReading;

pub const OWNER: AccountId = AccountId(1);
pub const OTHER_OWNER: AccountId = AccountId(2);

pub fn meter(owner: AccountId, meter_id: &str) -> Meter {
    Meter {
        id: Uuid::new_v4(),
        meter_id: meter_id.to_string(),
        name: format!("{meter_id} meter"),
        meter_type: MeterType::Digital,
        location: Some("Basement".to_string()),
        installation_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        is_active: true,
        owner,
        created_at: Utc::now(),
    }
}

pub async fn store_with(meters: &[Meter]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for m in meters {
        store.register_meter(m.clone()).await;
    }
    store
}

pub fn test_config() -> Config {
    Config {
        disable_rate_limiting: true,
        ..Config::default()
    }
}

pub fn state_with(store: Arc<MemoryStore>, config: Config) -> AppState {
    AppState::new(Backend::memory(store), config)
}

pub fn raw(meter_id: &str, volume: &str, flow_rate: &str) -> RawReading {
    RawReading {
        meter_id: Some(meter_id.to_string()),
        volume: Some(volume.to_string()),
        flow_rate: Some(flow_rate.to_string()),
        temperature: None,
    }
}
