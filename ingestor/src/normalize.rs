use crate::errors::{Error, Result};
use crate::model::{
    Reading, SaveMeasurementRequest, SaveReadingRequest, KIND_HUMIDITY, KIND_TEMPERATURE,
};
use crate::topic::{metric_kind, DecodedTopic};
use chrono::{DateTime, Utc};

/// Builds a reading from a decoded topic and a plain-text decimal payload.
///
/// `timestamp` is `None` on the broker path, where the reading is stamped with
/// the ingestion time.
pub fn normalize(
    decoded: DecodedTopic,
    payload: &[u8],
    timestamp: Option<DateTime<Utc>>,
) -> Result<Reading> {
    let value = parse_value(payload)?;
    let reading = Reading {
        device_id: decoded.device_id,
        metric_kind: decoded.metric_kind,
        value,
        timestamp: timestamp.unwrap_or_else(Utc::now),
    };
    validate(&reading)?;
    Ok(reading)
}

/// Normalizes a direct HTTP save request.
pub fn normalize_request(request: SaveReadingRequest) -> Result<Reading> {
    let reading = Reading {
        device_id: request.device_id.trim().to_string(),
        metric_kind: metric_kind(request.metric_kind.trim()),
        value: request.value,
        timestamp: request.timestamp.unwrap_or_else(Utc::now),
    };
    validate(&reading)?;
    Ok(reading)
}

/// Splits a combined pot measurement into a temperature and a humidity
/// reading sharing one timestamp.
pub fn normalize_measurement(request: SaveMeasurementRequest) -> Result<[Reading; 2]> {
    let device_id = request.pot_id.trim().to_string();
    let timestamp = request.date.unwrap_or_else(Utc::now);

    let readings = [
        Reading {
            device_id: device_id.clone(),
            metric_kind: KIND_TEMPERATURE.to_string(),
            value: request.temperature,
            timestamp,
        },
        Reading {
            device_id,
            metric_kind: KIND_HUMIDITY.to_string(),
            value: request.humidity,
            timestamp,
        },
    ];
    for reading in &readings {
        validate(reading)?;
    }
    Ok(readings)
}

/// Parses a payload as a finite decimal number.
pub fn parse_value(payload: &[u8]) -> Result<f64> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::InvalidPayload(format!("payload is not UTF-8: {}", e)))?
        .trim();

    if text.is_empty() {
        return Err(Error::InvalidPayload("payload is empty".to_string()));
    }

    let value: f64 = text
        .parse()
        .map_err(|_| Error::InvalidPayload(format!("'{}' is not a number", text)))?;

    if !value.is_finite() {
        return Err(Error::InvalidPayload(format!("'{}' is not finite", text)));
    }

    Ok(value)
}

/// Checks the invariants every stored reading must hold.
pub fn validate(reading: &Reading) -> Result<()> {
    if reading.device_id.is_empty() {
        return Err(Error::InvalidPayload("Device ID cannot be empty".to_string()));
    }

    if reading.metric_kind.is_empty() {
        return Err(Error::InvalidPayload(
            "Metric kind cannot be empty".to_string(),
        ));
    }

    if !reading.value.is_finite() {
        return Err(Error::InvalidPayload(format!(
            "Value {} is not a finite number",
            reading.value
        )));
    }

    Ok(())
}
