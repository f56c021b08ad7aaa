use crate::config::MqttConfig;
use crate::errors::{Error, Result};
use crate::metrics::{
    HANDLERS_IN_FLIGHT, MESSAGES_DROPPED_TOTAL, MESSAGES_TOTAL, READINGS_STORED_TOTAL,
    RECONNECTS_TOTAL, STORE_WRITE_SECONDS,
};
use crate::model::Reading;
use crate::normalize::normalize;
use crate::store::ReadingStore;
use crate::topic::decode_topic;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, Publish, QoS, SubAck,
    SubscribeFilter, SubscribeReasonCode, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
        }
    }
}

pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    options.set_keep_alive(config.keep_alive);
    // Persistent session: the broker keeps our subscriptions and queues QoS 1
    // messages across reconnects.
    options.set_clean_session(false);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    if config.tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    options
}

/// Owns the broker connection and fans each inbound message out to its own
/// handler task.
pub struct Subscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Vec<String>,
    dispatcher: Dispatcher,
    state: watch::Sender<ConnectionState>,
}

/// Hands inbound publishes to handler tasks, bounded by a semaphore.
struct Dispatcher {
    store: Arc<dyn ReadingStore>,
    workers: Arc<Semaphore>,
}

impl Subscriber {
    pub fn new(config: &MqttConfig, store: Arc<dyn ReadingStore>) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), 100);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            client,
            eventloop,
            topics: config.topics.clone(),
            dispatcher: Dispatcher {
                store,
                workers: Arc::new(Semaphore::new(config.max_in_flight)),
            },
            state,
        }
    }

    /// Receiver that follows the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Drives the connection until the process exits.
    ///
    /// Failing to reach the broker before the first successful connection is
    /// returned as an error. Later transport errors are logged and the
    /// connection is re-established with exponential backoff.
    pub async fn run(mut self) -> Result<()> {
        let (broker, port) = self.eventloop.mqtt_options.broker_address();
        info!("Connecting to MQTT broker at {}:{}", broker, port);

        let mut lifecycle = Lifecycle::new();
        lifecycle.start();
        self.state.send_replace(lifecycle.state());

        loop {
            let event = self.eventloop.poll().await;
            let step = lifecycle.step(&event);
            self.state.send_replace(lifecycle.state());

            match (step, event) {
                (Step::Subscribe, _) => self.subscribe()?,
                (Step::Dispatch, Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    self.dispatcher.dispatch(publish).await?
                }
                (Step::Continue, Ok(Event::Incoming(Packet::SubAck(ack)))) => {
                    self.log_suback(&ack)
                }
                (Step::Fatal, Err(e)) => {
                    error!("Could not connect to MQTT broker: {}", e);
                    return Err(Error::Connection(e.to_string()));
                }
                (Step::Retry(delay), Err(e)) => {
                    warn!(
                        "MQTT connection lost: {}. Reconnecting in {}ms...",
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    lifecycle.reconnecting();
                    self.state.send_replace(lifecycle.state());
                }
                _ => {}
            }
        }
    }

    fn subscribe(&self) -> Result<()> {
        let filters = self
            .topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtLeastOnce));
        self.client.try_subscribe_many(filters)?;
        info!("Subscribing to {:?} with QoS 1", self.topics);
        Ok(())
    }

    fn log_suback(&self, ack: &SubAck) {
        for (topic, code) in self.topics.iter().zip(&ack.return_codes) {
            if matches!(code, SubscribeReasonCode::Failure) {
                warn!("Broker rejected subscription to {}", topic);
            }
        }
        info!("Subscribed to {} topic pattern(s)", self.topics.len());
    }
}

/// What the event loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Subscribe,
    Dispatch,
    Retry(Duration),
    Fatal,
}

/// Connection state machine, kept free of I/O.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    connected_once: bool,
    backoff_ms: u64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connected_once: false,
            backoff_ms: INITIAL_BACKOFF_MS,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Called once the retry delay has elapsed.
    pub fn reconnecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn step(&mut self, event: &std::result::Result<Event, ConnectionError>) -> Step {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if self.connected_once {
                    RECONNECTS_TOTAL.inc();
                    info!("Reconnected to MQTT broker");
                } else {
                    info!("Connected to MQTT broker");
                }
                self.connected_once = true;
                self.backoff_ms = INITIAL_BACKOFF_MS;

                if ack.session_present {
                    debug!("Broker kept our session, subscriptions still active");
                    self.state = ConnectionState::Subscribed;
                    Step::Continue
                } else {
                    Step::Subscribe
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                self.state = ConnectionState::Subscribed;
                Step::Continue
            }
            Ok(Event::Incoming(Packet::Publish(_))) => Step::Dispatch,
            Ok(_) => Step::Continue,
            Err(_) => {
                self.state = ConnectionState::Disconnected;
                if !self.connected_once {
                    return Step::Fatal;
                }
                let delay = Duration::from_millis(self.backoff_ms);
                self.backoff_ms = (self.backoff_ms * 2).min(MAX_BACKOFF_MS);
                Step::Retry(delay)
            }
        }
    }
}

impl Dispatcher {
    async fn dispatch(&self, publish: Publish) -> Result<()> {
        MESSAGES_TOTAL.inc();
        debug!(
            "Received message on topic {}, size: {} bytes",
            publish.topic,
            publish.payload.len()
        );

        // Waiting here stops the event loop from reading further messages
        // while every handler slot is busy.
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::WorkerPoolClosed)?;
        let store = self.store.clone();

        tokio::spawn(async move {
            HANDLERS_IN_FLIGHT.inc();
            handle_message(store.as_ref(), &publish.topic, &publish.payload).await;
            HANDLERS_IN_FLIGHT.dec();
            drop(permit);
        });
        Ok(())
    }
}

/// Runs one message through decode, normalize and store, logging and
/// counting it when it is dropped. Never fails.
pub async fn handle_message(
    store: &dyn ReadingStore,
    topic: &str,
    payload: &[u8],
) -> Option<Reading> {
    match process_message(store, topic, payload).await {
        Ok(reading) => {
            debug!(
                device_id = %reading.device_id,
                metric_kind = %reading.metric_kind,
                value = reading.value,
                "Saved reading"
            );
            Some(reading)
        }
        Err(e) => {
            MESSAGES_DROPPED_TOTAL
                .with_label_values(&[e.drop_reason()])
                .inc();
            warn!(topic, "Dropping message: {}", e);
            None
        }
    }
}

async fn process_message(
    store: &dyn ReadingStore,
    topic: &str,
    payload: &[u8],
) -> Result<Reading> {
    let decoded = decode_topic(topic)?;
    let reading = normalize(decoded, payload, None)?;

    let timer = STORE_WRITE_SECONDS.start_timer();
    store.write(&reading).await?;
    timer.observe_duration();
    READINGS_STORED_TOTAL.inc();

    Ok(reading)
}
