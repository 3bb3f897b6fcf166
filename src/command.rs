use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Binary switch command shared by both relay directions.
///
/// MQTT carries the uppercase form, the SmartThings API the lowercase one.
/// Parsing is case-insensitive and accepts nothing but "on" and "off".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCommand {
    On,
    Off,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid command '{0}'. Use ON or OFF")]
pub struct InvalidCommand(pub String);

impl SwitchCommand {
    /// Wire form for the MQTT command/state topics.
    pub fn to_wire_upper(self) -> &'static str {
        match self {
            SwitchCommand::On => "ON",
            SwitchCommand::Off => "OFF",
        }
    }

    /// Wire form for the SmartThings `switch` capability.
    pub fn to_wire_lower(self) -> &'static str {
        match self {
            SwitchCommand::On => "on",
            SwitchCommand::Off => "off",
        }
    }
}

impl FromStr for SwitchCommand {
    type Err = InvalidCommand;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.eq_ignore_ascii_case("on") {
            Ok(SwitchCommand::On)
        } else if raw.eq_ignore_ascii_case("off") {
            Ok(SwitchCommand::Off)
        } else {
            Err(InvalidCommand(raw.to_string()))
        }
    }
}

impl fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_wire_upper())
    }
}
