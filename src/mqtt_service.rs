use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, QoS, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_tls: bool,
    pub mqtt_ca_cert_path: Option<String>,
    pub mqtt_keep_alive_secs: u64,
    pub mqtt_reconnect_interval_ms: u64,
    /// Topics subscribed after every successful connect.
    pub subscriptions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Failed to read CA certificate {path}: {source}")]
    CaCertificate {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("MQTT client is not connected")]
    NotConnected,
    #[error("MQTT client rejected the publish: {0}")]
    Client(#[from] ClientError),
    #[error("Timed out queueing the publish")]
    Timeout,
}

/// Outbound side of the broker connection.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError>;
}

/// Receives every inbound publish, in the order the connection delivers them.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

pub struct MqttService {
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    connected: AtomicBool,
    shutting_down: AtomicBool,
    pub(crate) config: MqttConfig,
}

impl MqttService {
    pub fn new(config: MqttConfig) -> Result<Arc<Self>, MqttError> {
        let mqtt_client_id = format!("switch_bridge_{}", Uuid::new_v4());
        debug!(
            "Configuring MQTT broker at {}:{}...",
            config.mqtt_host, config.mqtt_port
        );

        let mut mqtt_options =
            MqttOptions::new(mqtt_client_id, config.mqtt_host.clone(), config.mqtt_port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs));
        mqtt_options.set_clean_session(true);
        mqtt_options.set_credentials(config.mqtt_username.clone(), config.mqtt_password.clone());

        if config.mqtt_tls {
            let transport = match &config.mqtt_ca_cert_path {
                Some(path) => {
                    let ca = std::fs::read(path).map_err(|source| MqttError::CaCertificate {
                        path: path.clone(),
                        source,
                    })?;
                    Transport::tls(ca, None, None)
                }
                None => Transport::tls_with_default_config(),
            };
            mqtt_options.set_transport(transport);
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, 10);

        Ok(Arc::new(Self {
            client,
            eventloop: Mutex::new(Some(eventloop)),
            connected: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            config,
        }))
    }

    /// Drives the connection until [`MqttService::shutdown`] completes.
    ///
    /// Connection errors never end the loop: the flag flips to disconnected,
    /// the loop sleeps the reconnect interval and polls again, which makes
    /// rumqttc dial the broker anew.
    pub async fn start(self: Arc<Self>, handler: Arc<dyn MessageHandler>) {
        info!("Starting MQTT service...");

        let Some(mut eventloop) = self.eventloop.lock().await.take() else {
            error!("MQTT service is already running.");
            return;
        };
        let retry_interval = Duration::from_millis(self.config.mqtt_reconnect_interval_ms);

        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    info!("Disconnected from MQTT broker.");
                    break;
                }
                Ok(event) => self.handle_event(event, handler.as_ref()),
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    if self.shutting_down.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("Error in MQTT event loop: {}", e);
                    if let Some(hint) = connection_hint(&e, &self.config) {
                        warn!("{}", hint);
                    }
                    warn!(
                        "Lost connection to MQTT broker. Retrying in {:?}...",
                        retry_interval
                    );
                    sleep(retry_interval).await;
                    info!("Reconnecting to MQTT broker...");
                }
            }
        }
    }

    fn handle_event(&self, event: Event, handler: &dyn MessageHandler) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!("MQTT broker refused connection: {:?}", ack.code);
                    return;
                }
                self.connected.store(true, Ordering::SeqCst);
                info!(
                    "Connected to MQTT broker {}:{}.",
                    self.config.mqtt_host, self.config.mqtt_port
                );
                self.subscribe_all();
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                debug!("Subscription {} acknowledged: {:?}", ack.pkid, ack.return_codes);
            }
            Event::Incoming(Packet::Publish(publish)) => {
                handler.on_message(&publish.topic, &publish.payload);
            }
            Event::Incoming(Packet::Disconnect) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!("MQTT broker closed the session.");
            }
            Event::Outgoing(_) => {
                debug!("Outgoing event.");
            }
            _ => {
                debug!("Unhandled event: {:?}", event);
            }
        }
    }

    // Runs inside the poll loop, so it must not await on the request channel.
    fn subscribe_all(&self) {
        for topic in &self.config.subscriptions {
            match self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                Ok(_) => info!("Subscribed to: {}", topic),
                Err(e) => error!("Failed to subscribe to topic '{}': {}", topic, e),
            }
        }
    }

    /// Sends DISCONNECT; [`MqttService::start`] returns once it is flushed.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to send MQTT disconnect: {}", e);
        }
    }
}

/// Operator hint for TLS handshake failures. Broker certificates are
/// verified, so a self-signed broker needs its CA configured explicitly.
fn connection_hint(error: &ConnectionError, config: &MqttConfig) -> Option<&'static str> {
    match error {
        ConnectionError::Tls(_) if config.mqtt_ca_cert_path.is_none() => Some(
            "TLS handshake failed: the broker certificate is checked against the system roots. \
             For a self-signed broker set MQTT_CA_CERT_PATH to its CA certificate.",
        ),
        ConnectionError::Tls(_) => {
            Some("TLS handshake failed: check that MQTT_CA_CERT_PATH holds the CA that signed the broker certificate.")
        }
        _ => None,
    }
}

#[async_trait]
impl CommandPublisher for MqttService {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), PublishError> {
        if !self.is_connected() {
            error!("MQTT publish to '{}' skipped: not connected", topic);
            return Err(PublishError::NotConnected);
        }

        let send = self
            .client
            .publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec());
        match timeout(PUBLISH_TIMEOUT, send).await {
            Ok(Ok(())) => {
                info!("Published to MQTT '{}': {}", topic, payload);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Failed to publish message to '{}': {}", topic, e);
                Err(e.into())
            }
            Err(_) => {
                error!("Timed out publishing message to '{}'", topic);
                Err(PublishError::Timeout)
            }
        }
    }
}
