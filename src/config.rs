use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_COMMAND_TOPIC: &str = "smartthings/nodemcu/switch/command";
pub const DEFAULT_STATE_TOPIC: &str = "smartthings/nodemcu/switch/state";
pub const DEFAULT_AVAILABILITY_TOPIC: &str = "smartthings/nodemcu/availability";
pub const DEFAULT_SMARTTHINGS_API_URL: &str = "https://api.smartthings.com";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Topics {
    pub command: String,
    pub state: String,
    pub availability: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_tls: bool,
    pub mqtt_ca_cert_path: Option<String>,
    pub mqtt_reconnect_interval_ms: u64,
    pub mqtt_keep_alive_secs: u64,

    pub topics: Topics,

    pub smartthings_token: Option<String>,
    pub smartthings_device_id: Option<String>,
    pub smartthings_api_url: String,
    pub smartthings_timeout_ms: u64,

    pub http_port: u16,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

impl Config {
    /// Validate timeout values and other critical configurations.
    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        check_range(
            "MQTT_RECONNECT_INTERVAL_MS",
            self.mqtt_reconnect_interval_ms,
            100,
            1_000_000,
        )?;
        check_range("MQTT_KEEP_ALIVE_SECS", self.mqtt_keep_alive_secs, 5, 3600)?;
        check_range(
            "SMARTTHINGS_TIMEOUT_MS",
            self.smartthings_timeout_ms,
            1000,
            60_000,
        )?;
        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingOrInvalid(key.to_string()));

        let config = Self {
            mqtt_broker: required("MQTT_BROKER")?,
            mqtt_port: parse_or("MQTT_PORT", get("MQTT_PORT"), 8883)?,
            mqtt_username: required("MQTT_USERNAME")?,
            mqtt_password: required("MQTT_PASSWORD")?,
            mqtt_tls: parse_flag("MQTT_TLS", get("MQTT_TLS"), true)?,
            mqtt_ca_cert_path: get("MQTT_CA_CERT_PATH"),
            mqtt_reconnect_interval_ms: parse_or(
                "MQTT_RECONNECT_INTERVAL_MS",
                get("MQTT_RECONNECT_INTERVAL_MS"),
                5000,
            )?,
            mqtt_keep_alive_secs: parse_or("MQTT_KEEP_ALIVE_SECS", get("MQTT_KEEP_ALIVE_SECS"), 60)?,

            topics: Topics {
                command: get("MQTT_TOPIC_COMMAND")
                    .unwrap_or_else(|| DEFAULT_COMMAND_TOPIC.to_string()),
                state: get("MQTT_TOPIC_STATE").unwrap_or_else(|| DEFAULT_STATE_TOPIC.to_string()),
                availability: get("MQTT_TOPIC_AVAILABILITY")
                    .unwrap_or_else(|| DEFAULT_AVAILABILITY_TOPIC.to_string()),
            },

            smartthings_token: get("SMARTTHINGS_TOKEN"),
            smartthings_device_id: get("SMARTTHINGS_DEVICE_ID"),
            smartthings_api_url: get("SMARTTHINGS_API_URL")
                .unwrap_or_else(|| DEFAULT_SMARTTHINGS_API_URL.to_string()),
            smartthings_timeout_ms: parse_or(
                "SMARTTHINGS_TIMEOUT_MS",
                get("SMARTTHINGS_TIMEOUT_MS"),
                10_000,
            )?,

            http_port: parse_or("PORT", get("PORT"), 3000)?,
        };

        // Validate timeouts after constructing the configuration
        config.validate_timeouts()?;

        Ok(config)
    }

    pub fn smartthings_configured(&self) -> bool {
        self.smartthings_token.is_some() && self.smartthings_device_id.is_some()
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::ParsingError(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::ParsingError(format!(
            "{} must be true or false",
            key
        ))),
    }
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::ParsingError(format!(
            "{} must be between {} and {}",
            key, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("MQTT_BROKER", "broker.example.com"),
        ("MQTT_USERNAME", "bridge"),
        ("MQTT_PASSWORD", "secret"),
    ];

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.mqtt_broker, "broker.example.com");
        assert_eq!(config.mqtt_port, 8883);
        assert!(config.mqtt_tls);
        assert_eq!(config.mqtt_reconnect_interval_ms, 5000);
        assert_eq!(config.mqtt_keep_alive_secs, 60);
        assert_eq!(config.topics.command, DEFAULT_COMMAND_TOPIC);
        assert_eq!(config.topics.state, DEFAULT_STATE_TOPIC);
        assert_eq!(config.topics.availability, DEFAULT_AVAILABILITY_TOPIC);
        assert_eq!(config.smartthings_api_url, DEFAULT_SMARTTHINGS_API_URL);
        assert_eq!(config.http_port, 3000);
        assert!(!config.smartthings_configured());
    }

    #[test]
    fn missing_credentials_are_rejected() {
        for missing in ["MQTT_BROKER", "MQTT_USERNAME", "MQTT_PASSWORD"] {
            let pairs: Vec<_> = REQUIRED
                .iter()
                .copied()
                .filter(|(k, _)| *k != missing)
                .collect();
            match Config::from_lookup(lookup(&pairs)) {
                Err(ConfigError::MissingOrInvalid(var)) => assert_eq!(var, missing),
                other => panic!("expected missing {}, got {:?}", missing, other),
            }
        }
    }

    #[test]
    fn empty_values_count_as_unset() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SMARTTHINGS_TOKEN", ""));
        pairs.push(("SMARTTHINGS_DEVICE_ID", "device-1"));
        pairs.push(("MQTT_TOPIC_STATE", "  "));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.smartthings_token, None);
        assert!(!config.smartthings_configured());
        assert_eq!(config.topics.state, DEFAULT_STATE_TOPIC);

        let pairs = [
            ("MQTT_BROKER", "broker.example.com"),
            ("MQTT_USERNAME", "bridge"),
            ("MQTT_PASSWORD", ""),
        ];
        match Config::from_lookup(lookup(&pairs)) {
            Err(ConfigError::MissingOrInvalid(var)) => assert_eq!(var, "MQTT_PASSWORD"),
            other => panic!("expected missing password, got {:?}", other),
        }
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("MQTT_PORT", "1883"),
            ("MQTT_TLS", "false"),
            ("MQTT_TOPIC_COMMAND", "home/lamp/set"),
            ("SMARTTHINGS_TOKEN", "token"),
            ("SMARTTHINGS_DEVICE_ID", "device-1"),
            ("PORT", "8080"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.mqtt_port, 1883);
        assert!(!config.mqtt_tls);
        assert_eq!(config.topics.command, "home/lamp/set");
        assert!(config.smartthings_configured());
        assert_eq!(config.http_port, 8080);
    }

    #[test]
    fn invalid_numbers_and_ranges_fail() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_PORT", "eighty"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::ParsingError(_))
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_RECONNECT_INTERVAL_MS", "10"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::ParsingError(_))
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_TLS", "maybe"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::ParsingError(_))
        ));
    }
}
