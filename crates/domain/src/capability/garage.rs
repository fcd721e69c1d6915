//! Garage-door opener.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CapabilityTag, CapabilityUnit, Command, DeviceCore, channel_of, entries, flag, path};
use crate::id::DeviceUuid;
use crate::namespace::Namespace;

/// Door position per channel, fed by `Appliance.GarageDoor.State`.
#[derive(Debug, Default)]
pub struct GarageDoor {
    open: BTreeMap<usize, bool>,
}

impl GarageDoor {
    /// Whether the door on `channel` was last reported open.
    #[must_use]
    pub fn is_open(&self, channel: usize) -> Option<bool> {
        self.open.get(&channel).copied()
    }

    /// Open or close the door on `channel`. The position only changes once
    /// the device pushes `GarageDoor.State`.
    #[must_use]
    pub fn command(&self, target: &DeviceUuid, channel: usize, open: bool) -> Command {
        Command::set(
            target.clone(),
            Namespace::GarageDoorState,
            json!({"state": {"channel": channel, "open": i32::from(open), "uuid": target}}),
        )
    }

    fn apply(&mut self, items: &[&Value]) -> bool {
        let mut applied = false;
        for item in items {
            if let Some(open) = flag(item, "open") {
                self.open.insert(channel_of(item), open);
                applied = true;
            }
        }
        applied
    }
}

impl CapabilityUnit for GarageDoor {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::GarageDoor
    }

    fn handle_push(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::GarageDoorState {
            return false;
        }
        let Some(state) = payload.get("state") else {
            tracing::error!(uuid = %core.uuid, "garage door push without `state` member");
            return false;
        };
        self.apply(&entries(Some(state)))
    }

    fn handle_update(&mut self, _core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::SystemAll {
            return false;
        }
        self.apply(&entries(path(payload, &["all", "digest", "garageDoor"])));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::AckEffect;

    fn core() -> DeviceCore {
        DeviceCore::new(DeviceUuid::new("msg100"))
    }

    #[test]
    fn should_open_channel_zero_on_push() {
        let mut unit = GarageDoor::default();
        let handled = unit.handle_push(
            &mut core(),
            &Namespace::GarageDoorState,
            &json!({"state": [{"channel": 0, "open": 1}]}),
        );
        assert!(handled);
        assert_eq!(unit.is_open(0), Some(true));
    }

    #[test]
    fn should_not_handle_push_without_state() {
        let mut unit = GarageDoor::default();
        assert!(!unit.handle_push(&mut core(), &Namespace::GarageDoorState, &json!({})));
        assert_eq!(unit.is_open(0), None);
    }

    #[test]
    fn should_read_digest_from_full_poll() {
        let mut unit = GarageDoor::default();
        let payload = json!({"all": {"digest": {"garageDoor": [{"channel": 0, "open": 0}]}}});
        assert!(unit.handle_update(&mut core(), &Namespace::SystemAll, &payload));
        assert_eq!(unit.is_open(0), Some(false));
    }

    #[test]
    fn should_address_command_to_device() {
        let target = DeviceUuid::new("msg100");
        let command = GarageDoor::default().command(&target, 0, true);
        assert_eq!(command.target, target);
        assert_eq!(
            command.payload,
            json!({"state": {"channel": 0, "open": 1, "uuid": "msg100"}})
        );
        assert_eq!(command.on_ack, AckEffect::None);
    }

    #[test]
    fn should_handle_full_poll_without_garage_digest() {
        let mut unit = GarageDoor::default();
        assert!(unit.handle_update(&mut core(), &Namespace::SystemAll, &json!({"all": {}})));
        assert_eq!(unit.is_open(0), None);
    }
}
