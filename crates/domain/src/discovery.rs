//! Records returned by the cloud discovery API.
//!
//! Field names follow the vendor JSON so responses can be deserialized
//! directly. Only the fields the engine consumes are modelled.

use serde::{Deserialize, Serialize};

use crate::id::{DeviceUuid, SubdeviceId};
use crate::online::OnlineStatus;
use crate::time::Timestamp;

/// A device listed by the discovery API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDeviceInfo {
    pub uuid: DeviceUuid,
    #[serde(default)]
    pub dev_name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub fmware_version: Option<String>,
    #[serde(default)]
    pub hdware_version: Option<String>,
    #[serde(default)]
    pub online_status: OnlineStatus,
    #[serde(default)]
    pub channels: Vec<serde_json::Value>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub bind_time: Option<Timestamp>,
}

impl HttpDeviceInfo {
    /// Minimal record, mostly useful for tests and static inventories.
    #[must_use]
    pub fn new(uuid: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            uuid: DeviceUuid::new(uuid),
            dev_name: None,
            device_type: Some(device_type.into()),
            fmware_version: None,
            hdware_version: None,
            online_status: OnlineStatus::Unknown,
            channels: Vec::new(),
            bind_time: None,
        }
    }
}

/// A subordinate device listed under a hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSubdeviceInfo {
    pub sub_device_id: SubdeviceId,
    #[serde(default)]
    pub true_id: Option<String>,
    #[serde(default)]
    pub sub_device_type: Option<String>,
    #[serde(default)]
    pub sub_device_vendor: Option<String>,
    #[serde(default)]
    pub sub_device_name: Option<String>,
}

impl HttpSubdeviceInfo {
    /// Minimal record, mostly useful for tests and static inventories.
    #[must_use]
    pub fn new(id: impl Into<String>, sub_device_type: impl Into<String>) -> Self {
        Self {
            sub_device_id: SubdeviceId::new(id),
            true_id: None,
            sub_device_type: Some(sub_device_type.into()),
            sub_device_vendor: None,
            sub_device_name: None,
        }
    }
}
