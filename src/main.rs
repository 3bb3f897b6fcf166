mod bridge;
mod command;
mod config;
mod models;
mod mqtt_service;
mod rest_server;
mod service_utils;
mod smartthings;
mod status;

use crate::bridge::Bridge;
use crate::config::Config;
use crate::mqtt_service::MqttService;
use crate::rest_server::run_rest_server;
use crate::service_utils::{
    handle_shutdown, mqtt_config, smartthings_config, start_mqtt_service,
    verify_smartthings_device,
};
use crate::smartthings::SmartThingsClient;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            error!("Required: MQTT_BROKER, MQTT_USERNAME, MQTT_PASSWORD");
            return ExitCode::FAILURE;
        }
    };

    info!("=== MQTT-SmartThings Bridge ===");
    info!("MQTT Broker: {}:{}", config.mqtt_broker, config.mqtt_port);
    info!("MQTT Username: {}", config.mqtt_username);
    info!(
        "SmartThings configured: {}",
        if config.smartthings_configured() { "Yes" } else { "No" }
    );

    let mqtt_service = match MqttService::new(mqtt_config(&config)) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to configure MQTT client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cloud = match SmartThingsClient::new(smartthings_config(&config)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build SmartThings client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let bridge = Arc::new(Bridge::new(
        mqtt_service.clone(),
        cloud.clone(),
        config.topics.clone(),
        config.mqtt_broker.clone(),
    ));

    let mqtt_task = start_mqtt_service(mqtt_service.clone(), bridge.clone());
    if config.smartthings_configured() {
        verify_smartthings_device(cloud);
    }

    // Serves until SIGTERM or Ctrl-C
    let served = run_rest_server(bridge, config.http_port).await;

    handle_shutdown(mqtt_service, mqtt_task).await;
    match served {
        Ok(()) => {
            info!("All services shut down successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("REST server stopped with error: {}", e);
            ExitCode::FAILURE
        }
    }
}
