//! Hub-to-subordinate delegation helpers.
//!
//! Hub-family payloads bundle state for several subordinates as arrays of
//! entries keyed by `id`. The helpers here split them so each entry can be
//! fed to the push contract of the matching subordinate.

use serde_json::{Value, json};

use super::{CapabilityTag, CapabilityUnit, DeviceCore, path};
use crate::id::SubdeviceId;
use crate::namespace::Namespace;
use crate::online::OnlineStatus;

/// Reachability of a subordinate, pushed by its hub on `Appliance.Hub.Online`.
#[derive(Debug, Default)]
pub struct SubdeviceOnline;

impl CapabilityUnit for SubdeviceOnline {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::SubdeviceOnline
    }

    fn handle_push(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::HubOnline {
            return false;
        }
        match payload.get("status") {
            Some(status) => {
                core.online = OnlineStatus::from_json(Some(status));
                true
            }
            None => false,
        }
    }
}

/// Split a hub-family payload into per-subordinate entries.
///
/// Every array member of the payload is scanned; entries without a string
/// `id` are skipped.
#[must_use]
pub fn subdevice_entries(payload: &Value) -> Vec<(SubdeviceId, &Value)> {
    let Some(object) = payload.as_object() else {
        return Vec::new();
    };
    object
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str)?;
            Some((SubdeviceId::new(id), entry))
        })
        .collect()
}

/// Read the subordinate reachability digest of a hub's full poll
/// (`all.digest.hub.subdevice[]`) as `Appliance.Hub.Online` entries.
#[must_use]
pub fn hub_digest_entries(payload: &Value) -> Vec<(SubdeviceId, Value)> {
    path(payload, &["all", "digest", "hub", "subdevice"])
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str)?;
            let status = entry.get("status")?;
            Some((SubdeviceId::new(id), json!({"id": id, "status": status})))
        })
        .collect()
}
