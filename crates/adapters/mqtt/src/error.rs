//! MQTT adapter error types.

use std::path::PathBuf;

use fleetlink_domain::error::FleetError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The broker connection is down.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client rejected a request.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The configured CA bundle could not be read.
    #[error("cannot read CA file {path}")]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<MqttError> for FleetError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::NotConnected => FleetError::TransportUnavailable,
            other => FleetError::Transport(Box::new(other)),
        }
    }
}
