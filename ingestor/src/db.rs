use crate::errors::{Error, Result};
use crate::model::Reading;
use crate::store::{RangeQuery, ReadingStore, TimeOrder};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed reading store. One row per reading; `(device_id, ts)` is
/// indexed but not unique.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_READING: &str = r#"
    INSERT INTO readings (device_id, metric_kind, value, ts)
    VALUES ($1, $2, $3, $4)
    "#;

// LIMIT NULL is LIMIT ALL in Postgres, so an absent limit binds as NULL.
const SELECT_ASC: &str = r#"
    SELECT device_id, metric_kind, value, ts AS timestamp
    FROM readings
    WHERE device_id = $1 AND ($2::timestamptz IS NULL OR ts >= $2)
    ORDER BY ts ASC, id ASC
    LIMIT $3
    "#;

const SELECT_DESC: &str = r#"
    SELECT device_id, metric_kind, value, ts AS timestamp
    FROM readings
    WHERE device_id = $1
    ORDER BY ts DESC, id DESC
    LIMIT $2
    "#;

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn write(&self, reading: &Reading) -> Result<()> {
        sqlx::query(INSERT_READING)
            .bind(&reading.device_id)
            .bind(&reading.metric_kind)
            .bind(reading.value)
            .bind(reading.timestamp)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        debug!(
            device_id = %reading.device_id,
            metric_kind = %reading.metric_kind,
            "Reading inserted"
        );
        Ok(())
    }

    async fn query_range(&self, device_id: &str, query: RangeQuery) -> Result<Vec<Reading>> {
        let limit = query.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));

        let readings = match query.order() {
            TimeOrder::Asc => {
                sqlx::query_as::<_, Reading>(SELECT_ASC)
                    .bind(device_id)
                    .bind(query.since)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            TimeOrder::Desc => {
                sqlx::query_as::<_, Reading>(SELECT_DESC)
                    .bind(device_id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(unavailable)?;

        Ok(readings)
    }
}

fn unavailable(err: sqlx::Error) -> Error {
    let detail = if is_transient_error(&err) {
        format!("connection problem: {}", err)
    } else {
        err.to_string()
    };
    Error::StoreUnavailable(detail)
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(is_transient_error(&sqlx::Error::PoolTimedOut));
        assert!(is_transient_error(&sqlx::Error::PoolClosed));
        assert!(!is_transient_error(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_errors_map_to_store_unavailable() {
        assert!(matches!(
            unavailable(sqlx::Error::PoolTimedOut),
            Error::StoreUnavailable(_)
        ));
        assert!(matches!(
            unavailable(sqlx::Error::RowNotFound),
            Error::StoreUnavailable(_)
        ));
    }
}
