//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`FleetError`]
//! via `#[from]`. There are no `String`-only variants for conditions a caller
//! is expected to match on.

use std::time::Duration;

use crate::id::{DeviceUuid, MessageId};

/// Base error for every fleetlink operation.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// A domain invariant was violated by the caller's input.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A device, channel or capability lookup found nothing.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A command was issued before the transport handshake completed, or
    /// after the connection dropped.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// No acknowledgement arrived before the deadline.
    #[error("command timed out")]
    CommandTimeout(#[from] CommandTimeoutError),

    /// The device answered with an `ERROR` frame.
    #[error("device reported an error")]
    Protocol(#[from] ProtocolError),

    /// A registry invariant does not hold. Indicates a construction bug.
    #[error("invariant violated")]
    Invariant(#[from] InvariantError),

    /// The underlying transport failed (publish, subscribe, connect).
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Input validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A device UUID was empty.
    #[error("device uuid must not be empty")]
    EmptyUuid,

    /// A message id was registered while another call with the same id is
    /// still outstanding.
    #[error("message id {0} is already pending")]
    DuplicateMessageId(MessageId),

    /// The device does not carry the capability the operation needs.
    #[error("device {uuid} does not support {capability}")]
    UnsupportedCapability {
        /// Device the operation was issued against.
        uuid: DeviceUuid,
        /// Human readable capability name.
        capability: &'static str,
    },

    /// A thermostat preset name outside the supported set.
    #[error("unsupported preset `{0}`")]
    UnsupportedPreset(String),

    /// `Manager::init` was called twice.
    #[error("manager already initialized")]
    AlreadyInitialized,
}

/// A lookup that found no (or no unique) match.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} `{id}` not found")]
pub struct NotFoundError {
    /// Kind of thing that was looked up (`"Device"`, `"Channel"`, …).
    pub entity: &'static str,
    /// The key used for the lookup.
    pub id: String,
}

/// Raised when an acknowledgement did not arrive in time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no acknowledgement for message {message_id} within {timeout:?}")]
pub struct CommandTimeoutError {
    /// Identifier of the abandoned request.
    pub message_id: MessageId,
    /// Deadline that elapsed.
    pub timeout: Duration,
}

/// An `ERROR` acknowledgement, carrying the device-reported payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("device returned an error: {payload}")]
pub struct ProtocolError {
    /// Raw payload of the `ERROR` frame.
    pub payload: serde_json::Value,
}

/// Registry invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    /// More than one non-subordinate device shares a broker UUID.
    #[error("{count} base devices registered with uuid {uuid}")]
    AmbiguousUuid {
        /// The duplicated UUID.
        uuid: DeviceUuid,
        /// Number of matches found.
        count: usize,
    },
}
