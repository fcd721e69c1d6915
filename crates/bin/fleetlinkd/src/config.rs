//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `fleetlink.toml` in the working directory, or the path in
//! `FLEETLINK_CONFIG`. Every field has a default so the file is optional,
//! but the account credentials must come from somewhere. Environment
//! variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use fleetlink_adapter_mqtt::MqttConfig;
use fleetlink_app::manager::ManagerConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    /// Broker connection, owned by the MQTT adapter.
    pub mqtt: MqttConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    /// Devices served by the static discovery API.
    pub inventory: InventoryConfig,
}

/// Vendor account credentials.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub user_id: String,
    pub key: String,
    /// Fixed application id; a fresh one is generated when absent.
    pub app_id: Option<String>,
}

/// Engine timing and discovery behaviour.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub command_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    /// Refresh new hubs after discovery so subordinates get a status.
    pub update_subdevice_status: bool,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub devices: Vec<InventoryDevice>,
}

/// One device bound to the account.
#[derive(Debug, Deserialize)]
pub struct InventoryDevice {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub hardware_version: Option<String>,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default)]
    pub subdevices: Vec<InventorySubdevice>,
}

/// One subordinate listed under a hub.
#[derive(Debug, Deserialize)]
pub struct InventorySubdevice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_online() -> bool {
    true
}

fn default_channels() -> usize {
    1
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FLEETLINK_CONFIG").unwrap_or_else(|_| "fleetlink.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLEETLINK_USER_ID") {
            self.account.user_id = val;
        }
        if let Ok(val) = std::env::var("FLEETLINK_KEY") {
            self.account.key = val;
        }
        if let Ok(val) = std::env::var("FLEETLINK_BROKER_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("FLEETLINK_BROKER_PORT")
            && let Ok(port) = val.parse()
        {
            self.mqtt.broker_port = port;
        }
        if let Ok(val) = std::env::var("FLEETLINK_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.account.user_id.is_empty() {
            return Err(ConfigError::Validation("account user_id must be set".to_string()));
        }
        if self.account.key.is_empty() {
            return Err(ConfigError::Validation("account key must be set".to_string()));
        }
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation("broker port must be non-zero".to_string()));
        }
        if self.engine.command_timeout_secs == 0 || self.engine.handshake_timeout_secs == 0 {
            return Err(ConfigError::Validation("timeouts must be non-zero".to_string()));
        }
        if let Some(device) = self.inventory.devices.iter().find(|device| device.uuid.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "inventory device {:?} has an empty uuid",
                device.name
            )));
        }
        Ok(())
    }

    /// Engine settings for a session using `app_id`.
    #[must_use]
    pub fn manager_config(&self, app_id: &str) -> ManagerConfig {
        ManagerConfig::new(self.account.user_id.clone(), self.account.key.clone(), app_id)
            .with_command_timeout(Duration::from_secs(self.engine.command_timeout_secs))
            .with_handshake_timeout(Duration::from_secs(self.engine.handshake_timeout_secs))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 5,
            handshake_timeout_secs: 10,
            update_subdevice_status: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fleetlinkd=info,fleetlink=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
