//! Parsing and ownership checks for one incoming telemetry sample.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::{AccountId, Meter};
use crate::store::MeterDirectory;

/// Telemetry exactly as the device posted it (form-encoded strings).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RawReading {
    /// Device-reported meter identifier
    pub meter_id: Option<String>,
    /// Liters since the previous sample
    pub volume: Option<String>,
    /// Liters per minute
    pub flow_rate: Option<String>,
    /// Degrees Celsius
    pub temperature: Option<String>,
}

/// A reading that passed validation but is not yet persisted or classified.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReading {
    pub meter: Meter,
    pub volume: f64,
    pub flow_rate: f64,
    pub temperature: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Numeric fields after parsing, before the meter lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    pub volume: f64,
    pub flow_rate: f64,
    pub temperature: Option<f64>,
}

/// Parse the numeric fields without touching storage.
///
/// # Errors
///
/// `AppError::InvalidInput` when `volume` or `flow_rate` is missing, not a
/// finite number, or negative, or when a supplied `temperature` is not a
/// finite number.
pub fn parse_measurements(raw: &RawReading) -> AppResult<Measurements> {
    let volume = non_negative("volume", raw.volume.as_deref())?;
    let flow_rate = non_negative("flow_rate", raw.flow_rate.as_deref())?;
    let temperature = raw
        .temperature
        .as_deref()
        .map(|t| finite("temperature", t))
        .transpose()?;

    Ok(Measurements {
        volume,
        flow_rate,
        temperature,
    })
}

/// Validate a raw sample for `owner`.
///
/// Numbers are checked first, then the meter is resolved within the owner's
/// meters only, so a foreign meter looks exactly like an unknown one.
///
/// # Errors
///
/// `InvalidInput` for malformed fields or (when `reject_inactive`) an inactive
/// meter, `NotFound` when the owner has no such meter, `Storage` when the
/// lookup fails.
pub async fn validate(
    raw: &RawReading,
    owner: AccountId,
    directory: &dyn MeterDirectory,
    reject_inactive: bool,
    now: DateTime<Utc>,
) -> AppResult<ValidatedReading> {
    let measurements = parse_measurements(raw)?;

    let meter_id = raw
        .meter_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidInput("meter_id is required".to_string()))?;

    let meter = directory
        .find_owned(owner, meter_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Meter '{meter_id}' not found")))?;

    if reject_inactive && !meter.is_active {
        return Err(AppError::InvalidInput(format!(
            "Meter '{meter_id}' is inactive"
        )));
    }

    Ok(ValidatedReading {
        meter,
        volume: measurements.volume,
        flow_rate: measurements.flow_rate,
        temperature: measurements.temperature,
        recorded_at: now,
    })
}

fn finite(field: &str, raw: &str) -> AppResult<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("{field} must be a number, got '{raw}'")))?;
    if !value.is_finite() {
        return Err(AppError::InvalidInput(format!("{field} must be finite")));
    }
    Ok(value)
}

fn non_negative(field: &str, raw: Option<&str>) -> AppResult<f64> {
    let raw = raw.ok_or_else(|| AppError::InvalidInput(format!("{field} is required")))?;
    let value = finite(field, raw)?;
    if value < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be non-negative, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(volume: Option<&str>, flow: Option<&str>, temp: Option<&str>) -> RawReading {
        RawReading {
            meter_id: Some("M1".into()),
            volume: volume.map(Into::into),
            flow_rate: flow.map(Into::into),
            temperature: temp.map(Into::into),
        }
    }

    #[test]
    fn accepts_well_formed_numbers() {
        let m = parse_measurements(&raw(Some("1.2"), Some(" 2.0 "), Some("-3.5"))).unwrap();
        assert_eq!(m.volume, 1.2);
        assert_eq!(m.flow_rate, 2.0);
        // No range bound on temperature
        assert_eq!(m.temperature, Some(-3.5));
    }

    #[test]
    fn temperature_is_optional() {
        let m = parse_measurements(&raw(Some("0"), Some("0"), None)).unwrap();
        assert_eq!(m.temperature, None);
    }

    #[test]
    fn rejects_missing_negative_and_garbage() {
        let cases = [
            raw(None, Some("1"), None),
            raw(Some("1"), None, None),
            raw(Some("-0.1"), Some("1"), None),
            raw(Some("1"), Some("-2"), None),
            raw(Some("abc"), Some("1"), None),
            raw(Some("1"), Some("NaN"), None),
            raw(Some("inf"), Some("1"), None),
            raw(Some("1"), Some("1"), Some("warm")),
            raw(Some("1"), Some("1"), Some("")),
        ];
        for case in cases {
            assert!(
                matches!(parse_measurements(&case), Err(AppError::InvalidInput(_))),
                "expected rejection for {case:?}"
            );
        }
    }
}
