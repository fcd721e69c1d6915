//! Typed identifier newtypes.
//!
//! Vendor identifiers are opaque strings (hex-like, not RFC 4122), so every
//! newtype wraps a `String` rather than a parsed UUID.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    /// Broker-assigned device identifier. Subordinates share their hub's.
    DeviceUuid
);

define_id!(
    /// Identifier of a subordinate device, unique within its hub.
    SubdeviceId
);

define_id!(
    /// Request identifier carried in the envelope header (`messageId`).
    MessageId
);

/// Library-derived identifier, unique within a registry.
///
/// Base and hub devices map to `#BASE:<uuid>`; subordinates append
/// `#SUB:<subdevice id>` since they share the hub's broker UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(String);

impl InternalId {
    /// Identifier of a base (or hub) device.
    #[must_use]
    pub fn base(uuid: &DeviceUuid) -> Self {
        Self(format!("#BASE:{uuid}"))
    }

    /// Identifier of a subordinate registered under `hub`.
    #[must_use]
    pub fn subdevice(hub: &DeviceUuid, subdevice_id: &SubdeviceId) -> Self {
        Self(format!("#BASE:{hub}#SUB:{subdevice_id}"))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a subordinate of the base device `hub`.
    #[must_use]
    pub fn is_subdevice_of(&self, hub: &InternalId) -> bool {
        !hub.0.contains("#SUB:")
            && self
                .0
                .strip_prefix(hub.as_str())
                .is_some_and(|rest| rest.starts_with("#SUB:"))
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
