use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Once;
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_messages_total",
        "Total messages received from MQTT"
    ))
    .unwrap();
    pub static ref READINGS_STORED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_readings_stored_total",
        "Total readings written to the store"
    ))
    .unwrap();
    pub static ref MESSAGES_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "ingestor_messages_dropped_total",
            "Total messages dropped, by reason"
        ),
        &["reason"]
    )
    .unwrap();
    pub static ref STORE_WRITE_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ingestor_store_write_seconds",
            "Time taken to write one reading to the store"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
    pub static ref HANDLERS_IN_FLIGHT: Gauge = Gauge::with_opts(Opts::new(
        "ingestor_handlers_in_flight",
        "Message handlers currently running"
    ))
    .unwrap();
    pub static ref RECONNECTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_reconnects_total",
        "Total broker connections established after the first"
    ))
    .unwrap();
}

static INIT: Once = Once::new();

pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(MESSAGES_TOTAL.clone()),
            Box::new(READINGS_STORED_TOTAL.clone()),
            Box::new(MESSAGES_DROPPED_TOTAL.clone()),
            Box::new(STORE_WRITE_SECONDS.clone()),
            Box::new(HANDLERS_IN_FLIGHT.clone()),
            Box::new(RECONNECTS_TOTAL.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_init() {
        init_metrics();
        init_metrics();
        MESSAGES_DROPPED_TOTAL
            .with_label_values(&["invalid_payload"])
            .inc();

        let text = gather_metrics();
        assert!(text.contains("ingestor_messages_dropped_total"));
    }
}
