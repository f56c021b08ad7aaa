//! History queries over the reading store.
//!
//! Requests are validated before the store is touched; a bad device id or an
//! unparseable `since` fails with `InvalidQuery` and costs no I/O.

use crate::errors::{Error, Result};
use crate::model::Reading;
use crate::store::{RangeQuery, ReadingStore};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_RECENT: usize = 100;

#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn ReadingStore>,
    max_recent: usize,
}

impl HistoryService {
    pub fn new(store: Arc<dyn ReadingStore>, max_recent: usize) -> Self {
        Self {
            store,
            max_recent: max_recent.max(1),
        }
    }

    /// Readings for a device, oldest first.
    ///
    /// With `since` only readings at or after that instant are returned.
    /// A supplied `limit` is capped at the configured maximum.
    pub async fn history(
        &self,
        device_id: &str,
        since: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Reading>> {
        let device_id = validate_device_id(device_id)?;
        let since = since
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_since)
            .transpose()?;
        let limit = limit.map(|l| l.min(self.max_recent));

        debug!(device_id, ?since, ?limit, "History query");
        self.store
            .query_range(device_id, RangeQuery { since, limit })
            .await
            .map(sort_ascending)
    }

    /// The newest readings for a device, newest first, at most the configured
    /// maximum regardless of the requested count.
    pub async fn recent(&self, device_id: &str, limit: Option<usize>) -> Result<Vec<Reading>> {
        let device_id = validate_device_id(device_id)?;
        let limit = limit.unwrap_or(self.max_recent).min(self.max_recent);

        debug!(device_id, limit, "Recent readings query");
        self.store
            .query_range(device_id, RangeQuery::latest(limit))
            .await
    }
}

// A limit without `since` comes back from the store newest first.
fn sort_ascending(mut readings: Vec<Reading>) -> Vec<Reading> {
    readings.sort_by_key(|r| r.timestamp);
    readings
}

fn validate_device_id(device_id: &str) -> Result<&str> {
    let device_id = device_id.trim();
    if device_id.is_empty() {
        return Err(Error::InvalidQuery("device id is required".to_string()));
    }
    Ok(device_id)
}

/// Parses a `since` value. Accepts RFC 3339, a date-time without offset
/// (taken as UTC), a plain date (UTC midnight) or epoch milliseconds.
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    // Bare epoch milliseconds; short digit runs such as a year are rejected.
    if raw.len() >= 10 && raw.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = raw
            .parse()
            .map_err(|_| Error::InvalidQuery(format!("'{}' is out of range", raw)))?;
        if let Some(ts) = DateTime::from_timestamp_millis(millis) {
            return Ok(ts);
        }
    }
    Err(Error::InvalidQuery(format!(
        "'{}' is not a valid point in time",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryReadingStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reading(device_id: &str, value: f64, timestamp: DateTime<Utc>) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            metric_kind: "humidity".to_string(),
            value,
            timestamp,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    async fn seeded(count: i64) -> Arc<InMemoryReadingStore> {
        let store = Arc::new(InMemoryReadingStore::new());
        for i in 0..count {
            store
                .write(&reading("potA", i as f64, t0() + Duration::seconds(i)))
                .await
                .unwrap();
        }
        store
    }

    /// Counts store calls so tests can prove validation happens first.
    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReadingStore for CountingStore {
        async fn write(&self, _reading: &Reading) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn query_range(&self, _device_id: &str, _query: RangeQuery) -> Result<Vec<Reading>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_parse_since_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(parse_since("2024-03-01T08:00:00Z").unwrap(), expected);
        assert_eq!(parse_since("2024-03-01T10:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_since("2024-03-01T08:00:00").unwrap(), expected);
        assert_eq!(parse_since("2024-03-01T08:00:00.000").unwrap(), expected);
        assert_eq!(
            parse_since(&expected.timestamp_millis().to_string()).unwrap(),
            expected
        );
        assert_eq!(
            parse_since("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_since_rejects_garbage() {
        for raw in [
            "yesterday",
            "2024-13-01",
            "not-a-date",
            "12:00",
            "2024",
            "20240301",
            "-1709280000000",
            "99999999999999999999",
        ] {
            assert!(matches!(parse_since(raw), Err(Error::InvalidQuery(_))));
        }
    }

    #[tokio::test]
    async fn test_invalid_query_never_touches_store() {
        let store = Arc::new(CountingStore::default());
        let service = HistoryService::new(store.clone(), DEFAULT_MAX_RECENT);

        assert!(matches!(
            service.history("potA", Some("garbage"), None).await,
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            service.history("  ", None, None).await,
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            service.recent("", Some(5)).await,
            Err(Error::InvalidQuery(_))
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_history_since_is_ascending() {
        let store = seeded(5).await;
        let service = HistoryService::new(store, DEFAULT_MAX_RECENT);

        let since = (t0() + Duration::seconds(2)).to_rfc3339();
        let result = service.history("potA", Some(&since), None).await.unwrap();
        let values: Vec<_> = result.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_history_without_since_returns_everything() {
        let store = seeded(5).await;
        let service = HistoryService::new(store, DEFAULT_MAX_RECENT);

        let result = service.history("potA", None, None).await.unwrap();
        assert_eq!(result.len(), 5);
        assert!(result.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_recent_is_capped() {
        let store = seeded(150).await;
        let service = HistoryService::new(store, 100);

        let result = service.recent("potA", Some(500)).await.unwrap();
        assert_eq!(result.len(), 100);
        assert_eq!(result[0].value, 149.0);

        let result = service.recent("potA", None).await.unwrap();
        assert_eq!(result.len(), 100);

        let result = service.recent("potA", Some(3)).await.unwrap();
        let values: Vec<_> = result.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![149.0, 148.0, 147.0]);
    }

    #[tokio::test]
    async fn test_history_limit_is_capped() {
        let store = seeded(150).await;
        let service = HistoryService::new(store, 100);

        let result = service
            .history("potA", Some(&t0().to_rfc3339()), Some(500))
            .await
            .unwrap();
        assert!(result.len() <= 100);
        assert_eq!(result[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_device_is_empty_not_error() {
        let store = seeded(3).await;
        let service = HistoryService::new(store, DEFAULT_MAX_RECENT);

        assert!(service.history("ghost", None, None).await.unwrap().is_empty());
        assert!(service.recent("ghost", None).await.unwrap().is_empty());
    }
}
