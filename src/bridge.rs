use crate::command::{InvalidCommand, SwitchCommand};
use crate::config::Topics;
use crate::mqtt_service::{CommandPublisher, MessageHandler, PublishError};
use crate::smartthings::SwitchCloud;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    State,
    Availability,
    Other,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    InvalidCommand(#[from] InvalidCommand),
    #[error("Topic and message required")]
    MissingFields,
    #[error("Failed to publish to MQTT: {0}")]
    Publish(#[from] PublishError),
}

/// Shared bridge context: the broker connection, the cloud leg and the
/// topic layout, created once at startup.
pub struct Bridge {
    publisher: Arc<dyn CommandPublisher>,
    cloud: Arc<dyn SwitchCloud>,
    topics: Topics,
    broker: String,
    started: Instant,
}

impl Bridge {
    pub fn new(
        publisher: Arc<dyn CommandPublisher>,
        cloud: Arc<dyn SwitchCloud>,
        topics: Topics,
        broker: String,
    ) -> Self {
        Self {
            publisher,
            cloud,
            topics,
            broker,
            started: Instant::now(),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn mqtt_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    pub fn cloud_configured(&self) -> bool {
        self.cloud.is_configured()
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn classify(&self, topic: &str) -> TopicClass {
        if topic == self.topics.state {
            TopicClass::State
        } else if topic == self.topics.availability {
            TopicClass::Availability
        } else {
            TopicClass::Other
        }
    }

    /// Reacts to one inbound MQTT message. A valid State payload with the
    /// cloud configured spawns exactly one cloud call, whose handle is
    /// returned; every other case is handled inline.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Option<JoinHandle<()>> {
        let payload = String::from_utf8_lossy(payload);
        info!("MQTT message [{}]: {}", topic, payload);

        match self.classify(topic) {
            TopicClass::State => {
                let cmd = match payload.parse::<SwitchCommand>() {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        debug!("Skipping state relay: {}", e);
                        return None;
                    }
                };
                if !self.cloud.is_configured() {
                    debug!("SmartThings not configured, state {} not relayed", cmd);
                    return None;
                }
                let cloud = self.cloud.clone();
                Some(tokio::spawn(async move {
                    relay_state(cloud.as_ref(), cmd).await;
                }))
            }
            TopicClass::Availability => {
                info!("Device availability: {}", payload);
                None
            }
            TopicClass::Other => {
                debug!("Ignoring message on unrelated topic '{}'", topic);
                None
            }
        }
    }

    /// Webhook entry point: validates, normalizes and publishes a retained
    /// command for the device.
    pub async fn control(&self, raw: Option<&str>) -> Result<SwitchCommand, BridgeError> {
        let cmd = raw
            .unwrap_or_default()
            .parse::<SwitchCommand>()
            .inspect_err(|e| info!("Rejected control request: {}", e))?;
        info!("Control command received: {}", cmd);

        self.publisher
            .publish(&self.topics.command, cmd.to_wire_upper(), true)
            .await?;
        Ok(cmd)
    }

    /// Diagnostic publish of an arbitrary retained message.
    pub async fn publish_raw(&self, topic: &str, message: &str) -> Result<(), BridgeError> {
        if topic.is_empty() || message.is_empty() {
            return Err(BridgeError::MissingFields);
        }
        self.publisher.publish(topic, message, true).await?;
        Ok(())
    }
}

impl MessageHandler for Bridge {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        // Cloud calls run detached; the handle is only useful to tests.
        let _ = self.dispatch(topic, payload);
    }
}

async fn relay_state(cloud: &dyn SwitchCloud, cmd: SwitchCommand) {
    match cloud.send_switch_command(cmd).await {
        Ok(response) => info!("Updated SmartThings: {} ({})", cmd, response),
        Err(e) => error!("SmartThings update failed: {}", e),
    }
}
