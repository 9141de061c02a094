//! Domain types shared by the store, detection and alerting layers.
//!
//! These are decoupled from the sea-orm entities in [`crate::entity`] so the
//! engine can run against any [`crate::store`] backend.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Authenticated account identity supplied by the web collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MeterType {
    Analog,
    Digital,
    Ultrasonic,
}

impl MeterType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analog => "analog",
            Self::Digital => "digital",
            Self::Ultrasonic => "ultrasonic",
        }
    }

    /// Unknown stored values fall back to `Digital`, the registration default.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "analog" => Self::Analog,
            "ultrasonic" => Self::Ultrasonic,
            _ => Self::Digital,
        }
    }
}

/// A registered metering device.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Meter {
    pub id: Uuid,
    /// Device-reported identifier, unique per owner
    pub meter_id: String,
    pub name: String,
    pub meter_type: MeterType,
    pub location: Option<String>,
    pub installation_date: NaiveDate,
    pub is_active: bool,
    pub owner: AccountId,
    pub created_at: DateTime<Utc>,
}

/// A reading ready to be appended to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub meter_id: Uuid,
    /// Assigned by the store when `None`
    pub recorded_at: Option<DateTime<Utc>>,
    pub volume: f64,
    pub flow_rate: f64,
    pub temperature: Option<f64>,
    pub is_leak: bool,
}

/// An immutable, persisted reading.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StoredReading {
    /// Insertion sequence; breaks ties between equal timestamps
    pub id: i64,
    pub meter_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Liters
    pub volume: f64,
    /// Liters per minute
    pub flow_rate: f64,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    pub is_leak: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Leak,
    HighUsage,
    Inactive,
    Other,
}

impl AlertType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leak => "leak",
            Self::HighUsage => "high_usage",
            Self::Inactive => "inactive",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "leak" => Self::Leak,
            "high_usage" => Self::HighUsage,
            "inactive" => Self::Inactive,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable anomaly record. `resolved_at` is set iff `is_resolved`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Alert {
    pub id: Uuid,
    pub meter_id: Uuid,
    pub alert_type: AlertType,
    pub message: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// A fresh, open alert.
    #[must_use]
    pub fn open(meter_id: Uuid, alert_type: AlertType, message: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            meter_id,
            alert_type,
            message,
            is_resolved: false,
            created_at: now,
            resolved_at: None,
        }
    }

    /// One-way transition to resolved. Returns `false` if already resolved.
    pub fn resolve(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_resolved {
            return false;
        }
        self.is_resolved = true;
        self.resolved_at = Some(at);
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_twice_keeps_first_timestamp() {
        let t0 = Utc::now();
        let mut alert = Alert::open(Uuid::new_v4(), AlertType::Leak, "x".into(), t0);
        assert!(alert.resolved_at.is_none());

        let t1 = t0 + chrono::Duration::minutes(1);
        assert!(alert.resolve(t1));
        assert_eq!(alert.resolved_at, Some(t1));

        assert!(!alert.resolve(t1 + chrono::Duration::minutes(5)));
        assert_eq!(alert.resolved_at, Some(t1));
        assert!(alert.is_resolved);
    }

    #[test]
    fn alert_type_round_trips_through_storage_names() {
        for kind in [
            AlertType::Leak,
            AlertType::HighUsage,
            AlertType::Inactive,
            AlertType::Other,
        ] {
            assert_eq!(AlertType::parse(kind.as_str()), kind);
        }
        assert_eq!(MeterType::parse("bogus"), MeterType::Digital);
    }
}
