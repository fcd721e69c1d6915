//! Broker connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration of the broker connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname, as handed out by the account login.
    pub broker_host: String,
    pub broker_port: u16,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Wrap the connection in TLS.
    pub tls: bool,
    /// PEM bundle to trust instead of the platform roots.
    pub ca_file: Option<PathBuf>,
    /// Keep polling after a connection loss so the client reconnects.
    pub auto_reconnect: bool,
    /// Pause between reconnection attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Capacity of the request and event channels.
    pub channel_capacity: usize,
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "iot.meross.com".to_string(),
            broker_port: 2001,
            keep_alive_secs: 30,
            tls: true,
            ca_file: None,
            auto_reconnect: true,
            reconnect_delay_ms: 1_000,
            channel_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_vendor_broker_over_tls() {
        let config = MqttConfig::default();
        assert_eq!(config.broker_host, "iot.meross.com");
        assert_eq!(config.broker_port, 2001);
        assert!(config.tls);
        assert!(config.auto_reconnect);
        assert_eq!(config.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn should_deserialize_from_toml() {
        let toml = r#"
            broker_host = "mqtt.example.com"
            broker_port = 8883
            keep_alive_secs = 60
            tls = false
            ca_file = "/etc/fleetlink/ca.pem"
            auto_reconnect = false
            reconnect_delay_ms = 250
        "#;
        let config: MqttConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker_host, "mqtt.example.com");
        assert_eq!(config.broker_port, 8883);
        assert!(!config.tls);
        assert_eq!(config.ca_file, Some(PathBuf::from("/etc/fleetlink/ca.pem")));
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
    }

    #[test]
    fn should_use_defaults_for_missing_fields() {
        let config: MqttConfig = toml::from_str(r#"broker_host = "192.168.1.100""#).unwrap();
        assert_eq!(config.broker_host, "192.168.1.100");
        assert_eq!(config.broker_port, 2001);
        assert_eq!(config.channel_capacity, 64);
    }
}
