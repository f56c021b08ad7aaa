use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const KIND_TEMPERATURE: &str = "temperature";
pub const KIND_HUMIDITY: &str = "humidity";

/// One observed value from one device at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: String,
    pub metric_kind: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/sensors/save`.
///
/// Producers disagree on field names, so the identity accepts `plantId` and
/// `potId` as well as `deviceId`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReadingRequest {
    #[serde(alias = "plantId", alias = "potId")]
    pub device_id: String,
    #[serde(alias = "sensorType")]
    pub metric_kind: String,
    pub value: f64,
    #[serde(default, alias = "date")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Body of `POST /api/sensors`: a paired temperature/humidity sample.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMeasurementRequest {
    #[serde(alias = "plantId", alias = "deviceId")]
    pub pot_id: String,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default, alias = "timestamp")]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub since: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
