//! Time-series store interface.
//!
//! Readings are append-only. There is no uniqueness constraint: a reading
//! redelivered by the broker after a reconnect is stored again and cannot be
//! told apart from a genuinely repeated measurement.

use crate::errors::Result;
use crate::model::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Sort direction of a range query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOrder {
    Asc,
    Desc,
}

/// Parameters of `ReadingStore::query_range`.
///
/// With `since` set, readings at or after it come back oldest first. Without
/// `since` but with `limit`, the newest `limit` readings come back newest
/// first. With neither, the full history comes back oldest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeQuery {
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RangeQuery {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            limit: None,
        }
    }

    pub fn latest(limit: usize) -> Self {
        Self {
            since: None,
            limit: Some(limit),
        }
    }

    pub fn order(&self) -> TimeOrder {
        match (self.since, self.limit) {
            (None, Some(_)) => TimeOrder::Desc,
            _ => TimeOrder::Asc,
        }
    }
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persists one reading. Fails with `StoreUnavailable` when the medium
    /// cannot be reached.
    async fn write(&self, reading: &Reading) -> Result<()>;

    /// Returns readings for one device. An unknown device yields an empty
    /// vector.
    async fn query_range(&self, device_id: &str, query: RangeQuery) -> Result<Vec<Reading>>;
}
