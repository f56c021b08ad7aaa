use anyhow::Context;
use axum::{routing::get, Router};
use sensor_ingestor::config::{Config, StoreBackend};
use sensor_ingestor::db::{make_pool, PgReadingStore};
use sensor_ingestor::history::HistoryService;
use sensor_ingestor::memory::InMemoryReadingStore;
use sensor_ingestor::metrics;
use sensor_ingestor::mqtt::Subscriber;
use sensor_ingestor::rest;
use sensor_ingestor::store::ReadingStore;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    info!("Starting sensor ingestor");
    info!("MQTT broker: {}:{}", config.mqtt.broker, config.mqtt.port);
    info!("MQTT topics: {:?}", config.mqtt.topics);
    info!("HTTP server: {}", config.http_addr);

    metrics::init_metrics();

    let store: Arc<dyn ReadingStore> = match config.store_backend {
        StoreBackend::Postgres => {
            info!("Database: {}", config.redacted_database_url());
            let pool = make_pool(&config.database_url, config.db_max_connections)
                .await
                .context("failed to connect to database")?;
            Arc::new(PgReadingStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, readings are lost on exit");
            Arc::new(InMemoryReadingStore::new())
        }
    };

    let history = HistoryService::new(store.clone(), config.history_max_recent);

    let subscriber = Subscriber::new(&config.mqtt, store.clone());
    let mqtt_state = subscriber.state();
    let mqtt_handle = tokio::spawn(subscriber.run());

    // Build HTTP app with REST API and metrics endpoint
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(store, history, mqtt_state));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        result = mqtt_handle => {
            error!("MQTT task terminated");
            result
                .context("MQTT task panicked")?
                .context("MQTT subscriber stopped")?;
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
