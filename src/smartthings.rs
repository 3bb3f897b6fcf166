use crate::command::SwitchCommand;
use crate::models::{DeviceCommandRequest, DeviceInfo};
use async_trait::async_trait;
use reqwest::{Client, Request, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Outcome of one outbound command call.
pub type CloudCallResult = Result<serde_json::Value, CloudError>;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("SmartThings token or device id is not configured")]
    NotConfigured,
    #[error("SmartThings responded with {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("SmartThings request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed SmartThings response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SmartThingsConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub device_id: Option<String>,
    pub timeout_ms: u64,
}

/// The cloud leg as seen by the bridge.
#[async_trait]
pub trait SwitchCloud: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn send_switch_command(&self, cmd: SwitchCommand) -> CloudCallResult;
}

pub struct SmartThingsClient {
    http: Client,
    config: SmartThingsConfig,
}

impl SmartThingsClient {
    pub fn new(config: SmartThingsConfig) -> Result<Self, CloudError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { http, config })
    }

    fn credentials(&self) -> Result<(&str, &str), CloudError> {
        match (
            self.config.token.as_deref(),
            self.config.device_id.as_deref(),
        ) {
            (Some(token), Some(device_id)) if !token.is_empty() && !device_id.is_empty() => {
                Ok((token, device_id))
            }
            _ => Err(CloudError::NotConfigured),
        }
    }

    fn device_url(&self, device_id: &str) -> String {
        format!(
            "{}/v1/devices/{}",
            self.config.api_url.trim_end_matches('/'),
            device_id
        )
    }

    fn device_info_request(&self) -> Result<Request, CloudError> {
        let (token, device_id) = self.credentials()?;
        Ok(self
            .http
            .get(self.device_url(device_id))
            .bearer_auth(token)
            .build()?)
    }

    fn command_request(&self, cmd: SwitchCommand) -> Result<Request, CloudError> {
        let (token, device_id) = self.credentials()?;
        Ok(self
            .http
            .post(format!("{}/commands", self.device_url(device_id)))
            .bearer_auth(token)
            .json(&DeviceCommandRequest::switch(cmd))
            .build()?)
    }

    /// Executes a request and returns the raw body, mapping non-2xx answers
    /// to [`CloudError::Http`] with whatever body the API sent back. A body
    /// that cannot be read on a 2xx answer is a transport failure.
    async fn execute(&self, request: Request) -> Result<String, CloudError> {
        debug!("SmartThings {} {}", request.method(), request.url().path());
        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Http { status, body });
        }
        Ok(response.text().await?)
    }

    pub async fn get_device_info(&self) -> Result<DeviceInfo, CloudError> {
        let request = self.device_info_request()?;
        let body = self.execute(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SwitchCloud for SmartThingsClient {
    fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn send_switch_command(&self, cmd: SwitchCommand) -> CloudCallResult {
        let request = self.command_request(cmd)?;
        let body = self.execute(request).await?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}
