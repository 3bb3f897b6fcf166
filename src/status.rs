use crate::bridge::Bridge;
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
pub struct MqttHealth {
    pub connected: bool,
    pub broker: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SmartThingsHealth {
    pub configured: bool,
}

/// Liveness view served on `GET /`.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub mqtt: MqttHealth,
    pub smartthings: SmartThingsHealth,
    pub uptime: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct TopicNames {
    pub command: String,
    pub state: String,
    pub availability: String,
}

/// Status view served on `GET /status`. Carries no credentials.
#[derive(Debug, Serialize, PartialEq)]
pub struct Status {
    pub mqtt_connected: bool,
    pub topics: TopicNames,
}

pub fn health(bridge: &Bridge) -> Health {
    Health {
        status: "running",
        mqtt: MqttHealth {
            connected: bridge.mqtt_connected(),
            broker: bridge.broker().to_string(),
        },
        smartthings: SmartThingsHealth {
            configured: bridge.cloud_configured(),
        },
        uptime: bridge.uptime_secs(),
    }
}

pub fn status(bridge: &Bridge) -> Status {
    let topics = bridge.topics();
    Status {
        mqtt_connected: bridge.mqtt_connected(),
        topics: TopicNames {
            command: topics.command.clone(),
            state: topics.state.clone(),
            availability: topics.availability.clone(),
        },
    }
}
