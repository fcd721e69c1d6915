//! Transport port: the publish/subscribe connection to the broker.

use std::future::Future;
use std::sync::Arc;

use fleetlink_domain::error::FleetError;

/// Lifecycle and delivery events raised by a transport.
///
/// Transports post these onto the `mpsc` channel handed to
/// [`Manager::new`](crate::manager::Manager::new); a single dispatch task
/// consumes them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    Connected,
    /// The broker acknowledged the subscription request.
    Subscribed,
    /// The connection dropped.
    Disconnected { reason: String },
    /// An inbound frame.
    Message { topic: String, payload: Vec<u8> },
}

/// Outbound side of a broker connection.
///
/// Implementations live in adapter crates (e.g. `fleetlink-adapter-mqtt`).
pub trait Transport: Send + Sync + 'static {
    /// Publish a frame on `topic`.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), FleetError>> + Send;

    /// Subscribe to every topic in `topics`. Completion is signalled later by
    /// [`TransportEvent::Subscribed`].
    fn subscribe(&self, topics: Vec<String>) -> impl Future<Output = Result<(), FleetError>> + Send;

    /// Close the connection.
    fn disconnect(&self) -> impl Future<Output = Result<(), FleetError>> + Send;

    /// Whether the broker connection is currently up.
    fn is_connected(&self) -> bool;
}

impl<T: Transport> Transport for Arc<T> {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), FleetError>> + Send {
        (**self).publish(topic, payload)
    }

    fn subscribe(&self, topics: Vec<String>) -> impl Future<Output = Result<(), FleetError>> + Send {
        (**self).subscribe(topics)
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), FleetError>> + Send {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
