//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the engine and the outside world. They
//! are defined here (in `app`) so that both the engine and the adapter layer
//! can depend on them without creating circular dependencies.

pub mod discovery;
pub mod transport;

pub use discovery::DiscoveryApi;
pub use transport::{Transport, TransportEvent};
