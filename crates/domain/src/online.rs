//! Device online status.

use serde::{Deserialize, Serialize};

/// Reachability of a device as reported by the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum OnlineStatus {
    /// No report received yet, or an unrecognised status code.
    #[default]
    Unknown,
    /// Registered but never connected.
    NotOnline,
    Online,
    Offline,
    /// Firmware upgrade in progress.
    Upgrading,
}

impl OnlineStatus {
    /// Vendor status code.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::NotOnline => 0,
            Self::Online => 1,
            Self::Offline => 2,
            Self::Upgrading => 3,
        }
    }

    /// Read a status code out of an optional JSON value; anything that is not
    /// a known integer code maps to [`Unknown`](Self::Unknown).
    #[must_use]
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        value
            .and_then(serde_json::Value::as_i64)
            .map_or(Self::Unknown, Self::from)
    }
}

impl From<i64> for OnlineStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::NotOnline,
            1 => Self::Online,
            2 => Self::Offline,
            3 => Self::Upgrading,
            _ => Self::Unknown,
        }
    }
}

impl From<OnlineStatus> for i64 {
    fn from(status: OnlineStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::NotOnline => f.write_str("not_online"),
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
            Self::Upgrading => f.write_str("upgrading"),
        }
    }
}
