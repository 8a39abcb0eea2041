//! TOML configuration for the agent binary.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use sedge::types::utils::{node_id_from_mac, parse_mac, validate_name};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeSection {
    pub group_id: String,
    /// Explicit node id. Takes precedence over `mac`.
    pub node_id: Option<String>,
    /// Hardware address the node id is derived from, e.g. `00:1A:2B:AA:BB:CC`
    pub mac: Option<String>,
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: u64,
    #[serde(default)]
    pub rebirth_cooldown_secs: u64,
}

fn default_telemetry_interval() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Defaults to `sedge-<node id>`
    pub client_id: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            client_id: None,
            host: default_host(),
            port: default_port(),
            keep_alive_secs: default_keep_alive(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SensorSection {
    #[serde(default = "default_sensor_device")]
    pub device_id: String,
}

fn default_sensor_device() -> String {
    "dht".into()
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            device_id: default_sensor_device(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ControllerSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_controller_device")]
    pub device_id: String,
    #[serde(default = "default_setpoint")]
    pub default_setpoint: f32,
    #[serde(default = "default_deadband")]
    pub deadband: f32,
}

fn default_controller_device() -> String {
    "temp-controller".into()
}

fn default_setpoint() -> f32 {
    25.0
}

fn default_deadband() -> f32 {
    1.0
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            device_id: default_controller_device(),
            default_setpoint: default_setpoint(),
            deadband: default_deadband(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AgentConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_name(&self.node.group_id).map_err(ConfigError::InvalidConfig)?;
        self.node_id()?;
        validate_name(&self.sensor.device_id).map_err(ConfigError::InvalidConfig)?;
        if self.controller.enabled {
            validate_name(&self.controller.device_id).map_err(ConfigError::InvalidConfig)?;
            if self.controller.device_id == self.sensor.device_id {
                return Err(ConfigError::InvalidConfig(
                    "controller and sensor must use different device ids".into(),
                ));
            }
            if self.controller.deadband < 0.0 {
                return Err(ConfigError::InvalidConfig(
                    "controller deadband must not be negative".into(),
                ));
            }
        }
        if self.node.telemetry_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The configured node id, or the one derived from the MAC address
    pub fn node_id(&self) -> Result<String, ConfigError> {
        let node_id = match (&self.node.node_id, &self.node.mac) {
            (Some(node_id), _) => node_id.clone(),
            (None, Some(mac)) => node_id_from_mac(&parse_mac(mac).map_err(ConfigError::InvalidConfig)?),
            (None, None) => {
                return Err(ConfigError::InvalidConfig(
                    "one of node.node_id or node.mac must be set".into(),
                ))
            }
        };
        validate_name(&node_id).map_err(ConfigError::InvalidConfig)?;
        Ok(node_id)
    }

    pub fn client_id(&self) -> Result<String, ConfigError> {
        match &self.mqtt.client_id {
            Some(client_id) => Ok(client_id.clone()),
            None => Ok(format!("sedge-{}", self.node_id()?)),
        }
    }
}
