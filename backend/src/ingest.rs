//! Sensor ingest: authenticate, validate, persist the latest reading and
//! record it in the event log.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use common::req::Reading;
use log::{debug, warn};

use crate::{
    error::ApiError,
    req::{value_int, value_number, Params},
    store::Store,
    utils::{log_field, log_timestamp, round_1dp},
};

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -40.0..=85.0; // °C
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0; // percent

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub api_key: String,
    pub brand: String,
    pub default_device: String,
}

/// One ingest call as seen by the handler.
pub struct Submission<'a> {
    pub header_key: Option<&'a str>,
    pub params: &'a Params,
    pub peer: &'a str,
}

/// Header first, then body or query `api_key`.
pub fn authorize(
    header_key: Option<&str>,
    params: &Params,
    expected: &str,
) -> Result<(), ApiError> {
    let supplied = match header_key {
        Some(key) => Some(key.to_string()),
        None => params.text("api_key"),
    };
    match supplied {
        Some(key) if key == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

pub fn parse_reading(
    params: &Params,
    settings: &IngestSettings,
    now: DateTime<Utc>,
) -> Result<Reading, ApiError> {
    let (t, h) = match (params.get("t"), params.get("h")) {
        (Some(t), Some(h)) => (t, h),
        _ => return Err(ApiError::MissingField),
    };
    let temperature = round_1dp(value_number(t).ok_or(ApiError::InvalidNumber)?);
    let humidity = round_1dp(value_number(h).ok_or(ApiError::InvalidNumber)?);

    if !TEMPERATURE_RANGE.contains(&temperature) || !HUMIDITY_RANGE.contains(&humidity) {
        return Err(ApiError::OutOfRange);
    }

    let rssi = params
        .get("rssi")
        .filter(|v| v.as_str() != Some(""))
        .map(value_int);

    Ok(Reading {
        device: params
            .text("device")
            .unwrap_or_else(|| settings.default_device.clone()),
        temperature,
        humidity,
        time: now.timestamp(),
        brand: params
            .text("brand")
            .unwrap_or_else(|| settings.brand.clone()),
        rssi,
    })
}

pub fn log_line(reading: &Reading, peer: &str, now: DateTime<Utc>) -> String {
    let rssi = match reading.rssi {
        Some(rssi) => format!("{}dBm", rssi),
        None => "n/a".to_string(),
    };
    format!(
        "[{}] dev={} t={:.1}°C h={:.1}% rssi={} ip={} brand={}\n",
        log_timestamp(now),
        log_field(&reading.device),
        reading.temperature,
        reading.humidity,
        rssi,
        peer,
        log_field(&reading.brand)
    )
}

/// Run a full ingest. Nothing is written unless every check passes.
pub fn accept(
    store: &Store,
    settings: &IngestSettings,
    submission: &Submission,
    now: DateTime<Utc>,
) -> Result<Reading, ApiError> {
    authorize(submission.header_key, submission.params, &settings.api_key)?;
    let reading = parse_reading(submission.params, settings, now)?;

    store.latest.save(&reading).map_err(ApiError::WriteFailed)?;
    debug!(
        "Saved reading from {}: {:.1}°C {:.1}%",
        reading.device, reading.temperature, reading.humidity
    );

    // the reading is already persisted, a lost log line is not fatal
    if let Err(e) = store.log.append(&log_line(&reading, submission.peer, now)) {
        warn!("Failed to append to {}: {}", store.log.path().display(), e);
    }

    Ok(reading)
}
