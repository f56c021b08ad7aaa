//! In-memory reading store, used for local runs without Postgres and in tests.

use crate::errors::{Error, Result};
use crate::model::Reading;
use crate::store::{RangeQuery, ReadingStore, TimeOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Per-device series keyed by (timestamp, insertion sequence). The sequence
/// keeps repeated readings at the same instant from overwriting each other.
type Series = BTreeMap<(DateTime<Utc>, u64), Reading>;

#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    series: RwLock<HashMap<String, Series>>,
    seq: AtomicU64,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored readings across all devices.
    pub fn len(&self) -> usize {
        self.series
            .read()
            .map(|s| s.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn write(&self, reading: &Reading) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut series = self
            .series
            .write()
            .map_err(|_| Error::StoreUnavailable("lock poisoned".to_string()))?;
        series
            .entry(reading.device_id.clone())
            .or_default()
            .insert((reading.timestamp, seq), reading.clone());
        Ok(())
    }

    async fn query_range(&self, device_id: &str, query: RangeQuery) -> Result<Vec<Reading>> {
        let series = self
            .series
            .read()
            .map_err(|_| Error::StoreUnavailable("lock poisoned".to_string()))?;
        let Some(device) = series.get(device_id) else {
            return Ok(Vec::new());
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let readings = match (query.order(), query.since) {
            (TimeOrder::Asc, Some(since)) => device
                .range((since, 0)..)
                .map(|(_, r)| r.clone())
                .take(limit)
                .collect(),
            (TimeOrder::Asc, None) => device.values().take(limit).cloned().collect(),
            (TimeOrder::Desc, _) => device.values().rev().take(limit).cloned().collect(),
        };
        Ok(readings)
    }
}
