use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed topic: {0}")]
    MalformedTopic(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message worker pool closed")]
    WorkerPoolClosed,
}

impl Error {
    /// Short label used for the dropped-message metric.
    pub fn drop_reason(&self) -> &'static str {
        match self {
            Error::MalformedTopic(_) => "malformed_topic",
            Error::InvalidPayload(_) => "invalid_payload",
            Error::StoreUnavailable(_) | Error::Database(_) => "store_unavailable",
            _ => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
