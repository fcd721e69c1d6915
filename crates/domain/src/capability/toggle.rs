//! On/off switching, per channel.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{CapabilityTag, CapabilityUnit, Command, DeviceCore, channel_of, entries, flag, path};
use crate::id::DeviceUuid;
use crate::namespace::Namespace;

/// Multi-channel switching over `Appliance.Control.ToggleX`.
#[derive(Debug, Default)]
pub struct ToggleX {
    state: BTreeMap<usize, bool>,
}

impl ToggleX {
    /// Last known state of `channel`, if any was reported.
    #[must_use]
    pub fn is_on(&self, channel: usize) -> Option<bool> {
        self.state.get(&channel).copied()
    }

    /// Switch `channel` on or off.
    #[must_use]
    pub fn command(&self, target: &DeviceUuid, channel: usize, on: bool) -> Command {
        Command::set_echoed(
            target.clone(),
            Namespace::ControlToggleX,
            json!({"togglex": {"channel": channel, "onoff": i32::from(on)}}),
        )
    }

    fn apply(&mut self, items: &[&Value]) -> bool {
        let mut applied = false;
        for item in items {
            if let Some(on) = flag(item, "onoff") {
                self.state.insert(channel_of(item), on);
                applied = true;
            }
        }
        applied
    }
}

impl CapabilityUnit for ToggleX {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::ToggleX
    }

    fn handle_push(&mut self, _core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::ControlToggleX {
            return false;
        }
        self.apply(&entries(payload.get("togglex")))
    }

    fn handle_update(&mut self, _core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::SystemAll {
            return false;
        }
        self.apply(&entries(path(payload, &["all", "digest", "togglex"])))
    }
}

/// Legacy single-payload switching over `Appliance.Control.Toggle`.
#[derive(Debug, Default)]
pub struct Toggle {
    state: BTreeMap<usize, bool>,
}

impl Toggle {
    #[must_use]
    pub fn is_on(&self, channel: usize) -> Option<bool> {
        self.state.get(&channel).copied()
    }

    #[must_use]
    pub fn command(&self, target: &DeviceUuid, channel: usize, on: bool) -> Command {
        Command::set_echoed(
            target.clone(),
            Namespace::ControlToggle,
            json!({"toggle": {"channel": channel, "onoff": i32::from(on)}}),
        )
    }

    fn apply(&mut self, item: Option<&Value>) -> bool {
        match item.and_then(|item| flag(item, "onoff").map(|on| (channel_of(item), on))) {
            Some((channel, on)) => {
                self.state.insert(channel, on);
                true
            }
            None => false,
        }
    }
}

impl CapabilityUnit for Toggle {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::Toggle
    }

    fn handle_push(&mut self, _core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::ControlToggle {
            return false;
        }
        self.apply(payload.get("toggle"))
    }

    fn handle_update(&mut self, _core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::SystemAll {
            return false;
        }
        self.apply(path(payload, &["all", "control", "toggle"]))
    }
}
