//! # fleetlink-adapter-mqtt
//!
//! MQTT adapter: connects the engine to the vendor broker through rumqttc.
//!
//! ## Responsibilities
//! - Derive the broker login (password, client id) from the account credentials
//! - Open a TLS connection and run the rumqttc event loop
//! - Translate broker packets into [`TransportEvent`](fleetlink_app::ports::TransportEvent)s
//! - Publish and subscribe at QoS 0 on behalf of the engine
//!
//! ## Dependency rule
//! Depends on `fleetlink-app` (to implement its `Transport` port) and `fleetlink-domain`.

pub mod config;
pub mod credentials;
pub mod error;
pub mod transport;

pub use config::MqttConfig;
pub use credentials::MqttCredentials;
pub use error::MqttError;
pub use transport::{MqttTransport, connect};
