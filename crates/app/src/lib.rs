//! # fleetlink-app
//!
//! Protocol engine: correlation, routing, the device registry and the
//! **port definitions** (traits) adapters implement.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `Transport`: publish, subscribe and report connection events
//!   - `DiscoveryApi`: list the devices bound to the account
//! - Correlate requests with acknowledgements (`CorrelationTable`)
//! - Route inbound frames to pending calls or device push handlers
//!   (`NotificationRouter`)
//! - Own the fleet (`DeviceRegistry`) and drive it (`Manager`)
//!
//! ## Dependency rule
//! Depends on `fleetlink-domain` only (plus `tokio` for channels, tasks and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod commands;
pub mod correlation;
pub mod manager;
pub mod ports;
pub mod registry;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;
