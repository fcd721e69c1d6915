//! # fleetlink-domain
//!
//! Pure model of a cloud-connected appliance fleet.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - The signed message envelope and broker topic naming
//! - **Devices** (base, hub, subordinate) composed of **capability units**
//!   that interpret push notifications and poll responses into typed state
//! - The **factory** choosing units from vendor-reported abilities
//! - Discovery records as returned by the cloud API
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod capability;
pub mod channel;
pub mod device;
pub mod discovery;
pub mod factory;
pub mod message;
pub mod namespace;
pub mod online;
pub mod topic;
