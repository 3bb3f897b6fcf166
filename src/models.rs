use crate::command::SwitchCommand;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/devices/{deviceId}/commands`.
#[derive(Debug, Serialize)]
pub struct DeviceCommandRequest {
    pub commands: Vec<DeviceCommand>,
}

/// One capability invocation. The API rejects a missing `arguments` list,
/// so it is always serialized, empty for the switch capability.
#[derive(Debug, Serialize)]
pub struct DeviceCommand {
    pub component: String,
    pub capability: String,
    pub command: String,
    pub arguments: Vec<serde_json::Value>,
}

impl DeviceCommandRequest {
    pub fn switch(cmd: SwitchCommand) -> Self {
        Self {
            commands: vec![DeviceCommand {
                component: "main".to_string(),
                capability: "switch".to_string(),
                command: cmd.to_wire_lower().to_string(),
                arguments: Vec::new(),
            }],
        }
    }
}

/// Subset of the device description returned by `GET /v1/devices/{deviceId}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    #[serde(default, rename = "type")]
    pub device_type: Option<String>,
}

impl DeviceInfo {
    pub fn display_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.device_id)
    }
}
