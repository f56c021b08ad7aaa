mod sample;

use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS, Transport};
use sample::generate_sample;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Publishes simulated pot temperature and humidity readings.
#[derive(Debug, Parser)]
#[command(name = "sensor-simulator", version)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    #[arg(long, env = "MQTT_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD")]
    password: Option<String>,

    #[arg(long, env = "MQTT_TLS", default_value_t = false)]
    tls: bool,

    /// Messages per second across all devices
    #[arg(long, env = "RATE", default_value_t = 100)]
    rate: u64,

    #[arg(long, env = "DEVICES", default_value_t = 10)]
    devices: usize,

    /// Fraction of payloads that are deliberately not numbers
    #[arg(long, env = "MALFORMED_RATIO", default_value_t = 0.01)]
    malformed_ratio: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let rate = args.rate.max(1);
    let devices = args.devices.max(1);

    info!("Starting sensor simulator");
    info!(
        "Broker: {}:{}, Rate: {} msg/s, Devices: {}",
        args.broker, args.port, rate, devices
    );

    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        mqtt_options.set_credentials(username, password);
    }
    if args.tls {
        mqtt_options.set_transport(Transport::tls_with_default_config());
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 1000);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    let mut rng = rand::thread_rng();
    let mut counter = 0u64;
    let mut ticker = tokio::time::interval(Duration::from_micros((1_000_000 / rate).max(1)));

    loop {
        ticker.tick().await;

        let device_id = format!("pot-{}", counter % devices as u64);
        let sample = generate_sample(&mut rng, &device_id, args.malformed_ratio);

        match client
            .publish(&sample.topic, QoS::AtLeastOnce, false, sample.payload)
            .await
        {
            Ok(_) => counter += 1,
            Err(e) => warn!("Failed to publish to {}: {}", sample.topic, e),
        }

        if counter > 0 && counter % 1000 == 0 {
            info!("Published {} readings", counter);
        }
    }
}
