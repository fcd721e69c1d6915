//! Capability units: the pluggable building blocks of a [`Device`](crate::device::Device).
//!
//! A device is an ordered list of units on top of a shared [`DeviceCore`].
//! Each unit owns a slice of state and takes part in two interpretation
//! contracts:
//!
//! - [`CapabilityUnit::handle_push`] for live push notifications;
//! - [`CapabilityUnit::handle_update`] for full-state poll responses.
//!
//! Every unit sees every payload. The device OR-folds the results, so several
//! units may react to the same namespace and the caller still learns whether
//! anything consumed it.

mod electricity;
mod garage;
mod hub;
mod sensor;
mod system;
mod toggle;
mod valve;

pub use electricity::{Electricity, PowerInfo};
pub use garage::GarageDoor;
pub use hub::{SubdeviceOnline, hub_digest_entries, subdevice_entries};
pub use sensor::{TempHumSample, TempHumSensor};
pub use system::{SystemAll, SystemOnline};
pub use toggle::{Toggle, ToggleX};
pub use valve::{ThermostatValve, ValveMode};

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::ChannelInfo;
use crate::id::DeviceUuid;
use crate::message::Method;
use crate::namespace::Namespace;
use crate::online::OnlineStatus;

/// State shared by every unit of a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCore {
    pub uuid: DeviceUuid,
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub online: OnlineStatus,
    pub channels: Vec<ChannelInfo>,
}

impl DeviceCore {
    /// Core with only an identity; everything else unknown.
    #[must_use]
    pub fn new(uuid: DeviceUuid) -> Self {
        Self {
            uuid,
            name: None,
            device_type: None,
            firmware_version: None,
            hardware_version: None,
            online: OnlineStatus::Unknown,
            channels: Vec::new(),
        }
    }
}

/// Stable tag identifying what a unit (or a device role) offers.
///
/// Registry lookups filter on tags instead of inspecting concrete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTag {
    SystemAll,
    Online,
    ToggleX,
    Toggle,
    GarageDoor,
    Electricity,
    SubdeviceOnline,
    Sensor,
    Valve,
    Hub,
    Subdevice,
}

/// A pluggable unit of device behaviour.
pub trait CapabilityUnit: Any + Send + Sync + fmt::Debug {
    /// Tag used for registry filtering.
    fn tag(&self) -> CapabilityTag;

    /// Interpret a push notification. Returns whether this unit consumed it.
    fn handle_push(&mut self, _core: &mut DeviceCore, _namespace: &Namespace, _payload: &Value) -> bool {
        false
    }

    /// Interpret a full-state poll response. Returns whether this unit
    /// consumed it.
    fn handle_update(&mut self, _core: &mut DeviceCore, _namespace: &Namespace, _payload: &Value) -> bool {
        false
    }

    /// Namespace of the "get all" request this unit answers, if any.
    fn refresh_namespace(&self) -> Option<Namespace> {
        None
    }
}

/// What to do with the device once a command is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum AckEffect {
    /// Nothing; the acknowledgement carries no state.
    None,
    /// Optimistic update: apply this payload as if it had been pushed under
    /// the command's namespace.
    Push(Value),
    /// Feed the acknowledgement payload to the update contract.
    Update,
    /// Pick the `all[]` entry whose `id` is this subordinate's and feed it to
    /// the push contract.
    PushOwnEntry,
}

/// A request composed by a device, ready to be signed and published.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Device the request is addressed to. A hub for subordinate commands.
    pub target: DeviceUuid,
    pub method: Method,
    pub namespace: Namespace,
    pub payload: Value,
    pub on_ack: AckEffect,
}

impl Command {
    /// A `SET` that leaves local state untouched until the device reports.
    #[must_use]
    pub fn set(target: DeviceUuid, namespace: Namespace, payload: Value) -> Self {
        Self {
            target,
            method: Method::Set,
            namespace,
            payload,
            on_ack: AckEffect::None,
        }
    }

    /// A `SET` whose payload is also the optimistic local update.
    #[must_use]
    pub fn set_echoed(target: DeviceUuid, namespace: Namespace, payload: Value) -> Self {
        Self {
            target,
            method: Method::Set,
            namespace,
            on_ack: AckEffect::Push(payload.clone()),
            payload,
        }
    }
}

/// View a payload member that may be a single object or an array of them.
pub(crate) fn entries(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(object @ Value::Object(_)) => vec![object],
        _ => Vec::new(),
    }
}

/// Read a channel index, defaulting to the master channel.
pub(crate) fn channel_of(entry: &Value) -> usize {
    entry
        .get("channel")
        .and_then(Value::as_u64)
        .and_then(|channel| usize::try_from(channel).ok())
        .unwrap_or(0)
}

/// Read a vendor `0`/`1` flag.
pub(crate) fn flag(entry: &Value, key: &str) -> Option<bool> {
    entry.get(key).and_then(Value::as_i64).map(|value| value == 1)
}

/// Merge the members of `source` (minus `id`) into `target`.
pub(crate) fn merge_entry(target: &mut serde_json::Map<String, Value>, source: &Value) {
    if let Some(object) = source.as_object() {
        for (key, value) in object {
            if key != "id" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Read a deci-unit integer (`235` → `23.5`).
pub(crate) fn deci(map: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64).map(|raw| raw / 10.0)
}

/// Follow a path of object keys.
pub(crate) fn path<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().try_fold(value, |current, key| current.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_view_object_as_single_entry() {
        let payload = json!({"togglex": {"channel": 1, "onoff": 1}});
        let items = entries(payload.get("togglex"));
        assert_eq!(items.len(), 1);
        assert_eq!(channel_of(items[0]), 1);
        assert_eq!(flag(items[0], "onoff"), Some(true));
    }

    #[test]
    fn should_view_array_entries() {
        let payload = json!({"state": [{"channel": 0}, {"channel": 2}]});
        assert_eq!(entries(payload.get("state")).len(), 2);
        assert!(entries(payload.get("missing")).is_empty());
    }

    #[test]
    fn should_merge_entry_without_id() {
        let mut target = serde_json::Map::new();
        merge_entry(&mut target, &json!({"id": "SD1", "state": 2}));
        assert_eq!(target.get("state"), Some(&json!(2)));
        assert!(!target.contains_key("id"));
    }

    #[test]
    fn should_follow_nested_path() {
        let payload = json!({"all": {"system": {"online": {"status": 1}}}});
        assert_eq!(
            path(&payload, &["all", "system", "online", "status"]),
            Some(&json!(1))
        );
        assert_eq!(path(&payload, &["all", "digest"]), None);
    }

    #[test]
    fn should_echo_set_payload() {
        let command = Command::set_echoed(
            DeviceUuid::new("x"),
            Namespace::ControlToggleX,
            json!({"togglex": {"channel": 0, "onoff": 1}}),
        );
        assert_eq!(command.method, Method::Set);
        assert_eq!(command.on_ack, AckEffect::Push(command.payload.clone()));
    }
}
