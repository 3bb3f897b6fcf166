use crate::bridge::Bridge;
use crate::config::Config;
use crate::mqtt_service::{MqttConfig, MqttService};
use crate::smartthings::{SmartThingsClient, SmartThingsConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

pub fn mqtt_config(config: &Config) -> MqttConfig {
    MqttConfig {
        mqtt_host: config.mqtt_broker.clone(),
        mqtt_port: config.mqtt_port,
        mqtt_username: config.mqtt_username.clone(),
        mqtt_password: config.mqtt_password.clone(),
        mqtt_tls: config.mqtt_tls,
        mqtt_ca_cert_path: config.mqtt_ca_cert_path.clone(),
        mqtt_keep_alive_secs: config.mqtt_keep_alive_secs,
        mqtt_reconnect_interval_ms: config.mqtt_reconnect_interval_ms,
        subscriptions: vec![
            config.topics.state.clone(),
            config.topics.availability.clone(),
        ],
    }
}

pub fn smartthings_config(config: &Config) -> SmartThingsConfig {
    SmartThingsConfig {
        api_url: config.smartthings_api_url.clone(),
        token: config.smartthings_token.clone(),
        device_id: config.smartthings_device_id.clone(),
        timeout_ms: config.smartthings_timeout_ms,
    }
}

/// Start the MQTT service
pub fn start_mqtt_service(mqtt_service: Arc<MqttService>, bridge: Arc<Bridge>) -> JoinHandle<()> {
    tokio::spawn(async move {
        mqtt_service.start(bridge).await;
    })
}

/// Fetches and logs the configured device once at startup.
pub fn verify_smartthings_device(cloud: Arc<SmartThingsClient>) {
    tokio::spawn(async move {
        match cloud.get_device_info().await {
            Ok(device) => info!(
                "SmartThings device: {} ({}, {} by {})",
                device.display_name(),
                device.device_id,
                device.device_type.as_deref().unwrap_or("unknown type"),
                device.manufacturer_name.as_deref().unwrap_or("unknown manufacturer")
            ),
            Err(e) => warn!("SmartThings device lookup failed: {}", e),
        }
    });
}

/// Closes the broker connection cleanly, waiting a bounded time for the
/// DISCONNECT to be flushed.
pub async fn handle_shutdown(mqtt_service: Arc<MqttService>, mqtt_task: JoinHandle<()>) {
    info!("Shutting down, closing MQTT connection...");
    mqtt_service.shutdown().await;

    match timeout(DISCONNECT_GRACE, mqtt_task).await {
        Ok(Ok(())) => info!("MQTT connection closed."),
        Ok(Err(e)) => error!("MQTT task failed: {}", e),
        Err(_) => warn!("MQTT disconnect did not complete within {:?}", DISCONNECT_GRACE),
    }
}
