//! MQTT client for receiving WeeWX loop packets.
//!
//! This module owns the broker connection: it drives the rumqttc event loop,
//! (re)subscribes to the loop topic on every CONNACK, and forwards what
//! happens to the caller as [`WxEvent`]s over a channel.

use anyhow::Result;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Default broker address, the WeeWX host on the station LAN.
pub const MQTT_HOST: &str = "192.168.1.22";

/// Default MQTT port.
pub const MQTT_PORT: u16 = 1883;

/// Default client identifier presented to the broker.
pub const CLIENT_ID: &str = "weewx-fetch";

/// Topic the WeeWX MQTT extension publishes loop packets on.
pub const LOOP_TOPIC: &str = "weather/loop";

/// Configuration for the MQTT client.
#[derive(Debug, Clone)]
pub struct WxClientConfig {
    /// Hostname of the broker.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Optional username. The password is only sent with a username.
    pub username: Option<String>,

    /// Optional password.
    pub password: Option<String>,

    /// Client identifier.
    pub client_id: String,

    /// Topic to subscribe to.
    pub topic: String,

    /// MQTT keep-alive interval.
    pub keep_alive: Duration,

    /// Capacity of the request channel between client and event loop.
    pub request_capacity: usize,

    /// Whether to reconnect after the connection fails.
    pub auto_reconnect: bool,

    /// Delay before the first reconnection attempt.
    pub reconnect_delay: Duration,

    /// Upper bound for the exponential backoff.
    pub max_reconnect_delay: Duration,

    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WxClientConfig {
    fn default() -> Self {
        Self {
            host: MQTT_HOST.to_string(),
            port: MQTT_PORT,
            username: None,
            password: None,
            client_id: CLIENT_ID.to_string(),
            topic: LOOP_TOPIC.to_string(),
            keep_alive: Duration::from_secs(60),
            request_capacity: 10,
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            max_reconnect_attempts: 0,
        }
    }
}

impl WxClientConfig {
    /// Set the host and port.
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the login credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    /// Build the rumqttc options for this configuration.
    ///
    /// rumqttc speaks MQTT 3.1.1 over TCP by default, which is what the
    /// WeeWX broker setups expect.
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }

        options
    }

    /// Backoff before reconnection attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    fn may_retry(&self, failures: u32) -> bool {
        self.auto_reconnect
            && (self.max_reconnect_attempts == 0 || failures <= self.max_reconnect_attempts)
    }
}

/// Events from the MQTT client.
#[derive(Debug)]
pub enum WxEvent {
    /// The broker accepted the connection.
    Connected { session_present: bool, code: String },

    /// The broker acknowledged the subscription.
    Subscribed { topic: String, return_codes: String },

    /// A message arrived on the subscribed topic.
    Message { topic: String, payload: Vec<u8> },

    /// Connection was lost.
    Disconnected(String),

    /// An error occurred.
    Error(String),

    /// The client stopped reconnecting.
    GaveUp { attempts: u32 },
}

/// Async MQTT client for the loop topic.
pub struct WxClient {
    config: WxClientConfig,
}

impl WxClient {
    /// Create a new client with the given configuration.
    pub fn new(config: WxClientConfig) -> Self {
        Self { config }
    }

    /// Connect to the broker and start receiving loop packets.
    ///
    /// Returns a receiver channel that will receive `WxEvent`s.
    /// The connection runs in a background task.
    pub async fn connect(self) -> Result<mpsc::Receiver<WxEvent>> {
        let (tx, rx) = mpsc::channel(self.config.request_capacity.max(1));

        info!(
            "Connecting to {}:{} as {}",
            self.config.host, self.config.port, self.config.client_id
        );
        if let Some(username) = &self.config.username {
            info!("Using username {}", username);
        }

        let (client, event_loop) =
            AsyncClient::new(self.config.mqtt_options(), self.config.request_capacity);

        tokio::spawn(async move {
            self.run_event_loop(client, event_loop, tx).await;
        });

        Ok(rx)
    }

    /// Poll the event loop, forwarding events until told to stop.
    async fn run_event_loop(
        self,
        client: AsyncClient,
        mut event_loop: EventLoop,
        tx: mpsc::Sender<WxEvent>,
    ) {
        let mut failures: u32 = 0;
        let mut connected = false;

        loop {
            let event = match event_loop.poll().await {
                Ok(Event::Incoming(packet)) => packet,
                Ok(Event::Outgoing(outgoing)) => {
                    debug!("Outgoing: {:?}", outgoing);
                    continue;
                }
                Err(e) => {
                    failures += 1;
                    error!("Connection error: {}", e);

                    let event = if connected {
                        WxEvent::Disconnected(e.to_string())
                    } else {
                        WxEvent::Error(e.to_string())
                    };
                    connected = false;
                    if tx.send(event).await.is_err() {
                        return;
                    }

                    if !self.config.may_retry(failures) {
                        let _ = tx.send(WxEvent::GaveUp { attempts: failures }).await;
                        return;
                    }

                    let delay = self.config.backoff_delay(failures);
                    info!(
                        "Reconnecting in {:.1} seconds (attempt {})...",
                        delay.as_secs_f64(),
                        failures
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let forwarded = match event {
                Packet::ConnAck(ack) => {
                    failures = 0;
                    connected = true;

                    // Clean sessions drop subscriptions, so subscribe on every CONNACK
                    if let Err(e) = client.try_subscribe(&self.config.topic, QoS::AtMostOnce) {
                        warn!("Failed to queue subscription: {}", e);
                    }

                    Some(WxEvent::Connected {
                        session_present: ack.session_present,
                        code: format!("{:?}", ack.code),
                    })
                }
                Packet::SubAck(ack) => Some(WxEvent::Subscribed {
                    topic: self.config.topic.clone(),
                    return_codes: format!("{:?}", ack.return_codes),
                }),
                Packet::Publish(publish) => Some(WxEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                }),
                Packet::Disconnect => {
                    connected = false;
                    Some(WxEvent::Disconnected("Broker sent DISCONNECT".to_string()))
                }
                other => {
                    debug!("Incoming: {:?}", other);
                    None
                }
            };

            if let Some(event) = forwarded
                && tx.send(event).await.is_err()
            {
                // Receiver dropped
                let _ = client.try_disconnect();
                return;
            }
        }
    }
}
