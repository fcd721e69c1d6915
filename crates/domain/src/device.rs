//! Device: an enrolled appliance and the capability units it is made of.
//!
//! Three roles share one type:
//!
//! - a **base** device talks to the broker directly;
//! - a **hub** additionally owns a set of subordinate ids and fans its
//!   hub-family pushes out to them;
//! - a **subordinate** shares its hub's broker UUID, keeps the hub UUID as a
//!   lookup key (never an owning handle) and addresses every command to the
//!   hub.
//!
//! State only changes through the push/update interpretation contracts, the
//! acknowledgement of a command, or [`Device::update_from_http`].

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::capability::{AckEffect, CapabilityTag, CapabilityUnit, Command, DeviceCore};
use crate::channel::{ChannelInfo, ChannelKey, lookup, parse_channels};
use crate::discovery::HttpDeviceInfo;
use crate::error::{NotFoundError, ValidationError};
use crate::id::{DeviceUuid, InternalId, SubdeviceId};
use crate::message::Method;
use crate::namespace::Namespace;
use crate::online::OnlineStatus;

/// Shared, lockable reference to an enrolled device.
pub type DeviceHandle = Arc<Mutex<Device>>;

/// Vendor-reported ability map (`Appliance.System.Ability`), namespace → metadata.
pub type Abilities = serde_json::Map<String, Value>;

const UNKNOWN_NAME: &str = "unknown";

/// Subordinates registered to a hub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubState {
    subdevices: BTreeSet<SubdeviceId>,
}

/// Back-reference from a subordinate to its hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdeviceLink {
    pub hub: DeviceUuid,
    pub id: SubdeviceId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Base,
    Hub(HubState),
    Subdevice(SubdeviceLink),
}

/// How a device refreshes its full state.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshRequest {
    /// Poll the device itself; the response feeds the update contract.
    Direct(Command),
    /// Poll through the hub; the matching `all[]` entry feeds the push
    /// contract.
    ViaHub(Command),
    /// A subordinate that knows no refresh namespace.
    MissingNamespace,
    /// Nothing to poll.
    Unsupported,
}

#[derive(Debug)]
pub struct Device {
    core: DeviceCore,
    role: Role,
    abilities: Abilities,
    units: Vec<Box<dyn CapabilityUnit>>,
    tags: BTreeSet<CapabilityTag>,
}

impl Device {
    #[must_use]
    pub fn builder(uuid: DeviceUuid) -> DeviceBuilder {
        DeviceBuilder {
            core: DeviceCore::new(uuid),
            role: Role::Base,
            abilities: Abilities::new(),
            units: Vec::new(),
        }
    }

    #[must_use]
    pub fn uuid(&self) -> &DeviceUuid {
        &self.core.uuid
    }

    /// Registry key: `#BASE:<uuid>` or `#BASE:<uuid>#SUB:<id>`.
    #[must_use]
    pub fn internal_id(&self) -> InternalId {
        match &self.role {
            Role::Subdevice(link) => InternalId::subdevice(&link.hub, &link.id),
            Role::Base | Role::Hub(_) => InternalId::base(&self.core.uuid),
        }
    }

    /// Display name, `"unknown"` when the cloud reported none.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    #[must_use]
    pub fn device_type(&self) -> Option<&str> {
        self.core.device_type.as_deref()
    }

    #[must_use]
    pub fn firmware_version(&self) -> Option<&str> {
        self.core.firmware_version.as_deref()
    }

    #[must_use]
    pub fn hardware_version(&self) -> Option<&str> {
        self.core.hardware_version.as_deref()
    }

    /// Status last reported for this device alone. See
    /// [`effective_online_status`](Self::effective_online_status) for
    /// subordinates.
    #[must_use]
    pub fn online_status(&self) -> OnlineStatus {
        self.core.online
    }

    /// Status accounting for the hub a subordinate depends on.
    ///
    /// `hub` is the hub's own status, `None` when the hub is not enrolled.
    /// A subordinate is offline whenever its hub is not online.
    #[must_use]
    pub fn effective_online_status(&self, hub: Option<OnlineStatus>) -> OnlineStatus {
        match (&self.role, hub) {
            (Role::Subdevice(_), Some(OnlineStatus::Online)) | (Role::Base | Role::Hub(_), _) => {
                self.core.online
            }
            (Role::Subdevice(_), _) => OnlineStatus::Offline,
        }
    }

    #[must_use]
    pub fn channels(&self) -> &[ChannelInfo] {
        &self.core.channels
    }

    #[must_use]
    pub fn abilities(&self) -> &Abilities {
        &self.abilities
    }

    #[must_use]
    pub fn role(&self) -> &Role {
        &self.role
    }

    #[must_use]
    pub fn is_hub(&self) -> bool {
        matches!(self.role, Role::Hub(_))
    }

    #[must_use]
    pub fn subdevice_link(&self) -> Option<&SubdeviceLink> {
        match &self.role {
            Role::Subdevice(link) => Some(link),
            _ => None,
        }
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<CapabilityTag> {
        &self.tags
    }

    #[must_use]
    pub fn has_tag(&self, tag: CapabilityTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Borrow the unit of type `T`, if the device has one.
    #[must_use]
    pub fn unit<T: CapabilityUnit>(&self) -> Option<&T> {
        self.units.iter().find_map(|unit| {
            let unit: &dyn CapabilityUnit = &**unit;
            let any: &dyn Any = unit;
            any.downcast_ref::<T>()
        })
    }

    /// Like [`unit`](Self::unit) but fails for devices lacking the capability.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedCapability`] naming `capability`.
    pub fn require<T: CapabilityUnit>(&self, capability: &'static str) -> Result<&T, ValidationError> {
        self.unit::<T>()
            .ok_or_else(|| ValidationError::UnsupportedCapability {
                uuid: self.core.uuid.clone(),
                capability,
            })
    }

    /// Resolve exactly one channel by index or name.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when zero or several channels match.
    pub fn lookup_channel<'k>(&self, key: impl Into<ChannelKey<'k>>) -> Result<&ChannelInfo, NotFoundError> {
        lookup(&self.core.channels, key.into())
    }

    /// Push contract: every unit sees the payload, results are OR-folded.
    pub fn handle_push(&mut self, namespace: &Namespace, payload: &Value) -> bool {
        let mut handled = false;
        for unit in &mut self.units {
            handled |= unit.handle_push(&mut self.core, namespace, payload);
        }
        handled
    }

    /// Update contract: same discipline as [`handle_push`](Self::handle_push)
    /// over full-poll payloads.
    pub fn handle_update(&mut self, namespace: &Namespace, payload: &Value) -> bool {
        let mut handled = false;
        for unit in &mut self.units {
            handled |= unit.handle_update(&mut self.core, namespace, payload);
        }
        handled
    }

    /// Apply the local effect of an acknowledged command.
    pub fn acknowledge(&mut self, command: &Command, response: &Value) -> bool {
        match &command.on_ack {
            AckEffect::None => false,
            AckEffect::Push(echo) => self.handle_push(&command.namespace, echo),
            AckEffect::Update => self.handle_update(&command.namespace, response),
            AckEffect::PushOwnEntry => {
                let Some(id) = self.subdevice_link().map(|link| link.id.clone()) else {
                    return false;
                };
                let entry = response
                    .get("all")
                    .and_then(Value::as_array)
                    .and_then(|all| {
                        all.iter()
                            .find(|entry| entry.get("id").and_then(Value::as_str) == Some(id.as_str()))
                    })
                    .cloned();
                match entry {
                    Some(entry) => self.handle_push(&command.namespace, &entry),
                    None => {
                        tracing::warn!(
                            uuid = %self.core.uuid,
                            subdevice = %id,
                            namespace = %command.namespace,
                            "refresh response carries no entry for subdevice"
                        );
                        false
                    }
                }
            }
        }
    }

    /// Compose the full-state poll for this device.
    #[must_use]
    pub fn refresh_request(&self) -> RefreshRequest {
        let namespace = self.units.iter().find_map(|unit| unit.refresh_namespace());
        match (&self.role, namespace) {
            (Role::Subdevice(link), Some(namespace)) => RefreshRequest::ViaHub(Command {
                target: link.hub.clone(),
                method: Method::Get,
                namespace,
                payload: json!({"all": [{"id": link.id}]}),
                on_ack: AckEffect::PushOwnEntry,
            }),
            (Role::Subdevice(_), None) => RefreshRequest::MissingNamespace,
            (Role::Base | Role::Hub(_), Some(namespace)) => RefreshRequest::Direct(Command {
                target: self.core.uuid.clone(),
                method: Method::Get,
                namespace,
                payload: json!({}),
                on_ack: AckEffect::Update,
            }),
            (Role::Base | Role::Hub(_), None) => RefreshRequest::Unsupported,
        }
    }

    /// Register a subordinate id with this hub.
    ///
    /// Returns `false` (and logs) when the id is already registered or the
    /// device is not a hub.
    pub fn register_subdevice(&mut self, id: SubdeviceId) -> bool {
        let Role::Hub(state) = &mut self.role else {
            tracing::warn!(uuid = %self.core.uuid, subdevice = %id, "not a hub, cannot register subdevice");
            return false;
        };
        if state.subdevices.contains(&id) {
            tracing::warn!(uuid = %self.core.uuid, subdevice = %id, "subdevice already registered");
            return false;
        }
        state.subdevices.insert(id);
        true
    }

    /// Subordinate ids registered with this hub; empty for other roles.
    #[must_use]
    pub fn subdevice_ids(&self) -> Vec<SubdeviceId> {
        match &self.role {
            Role::Hub(state) => state.subdevices.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Refresh the identity attributes from a discovery record.
    pub fn update_from_http(&mut self, info: &HttpDeviceInfo) {
        if let Some(name) = &info.dev_name {
            self.core.name = Some(name.clone());
        }
        if let Some(device_type) = &info.device_type {
            self.core.device_type = Some(device_type.clone());
        }
        if let Some(version) = &info.fmware_version {
            self.core.firmware_version = Some(version.clone());
        }
        if let Some(version) = &info.hdware_version {
            self.core.hardware_version = Some(version.clone());
        }
        if !info.channels.is_empty() {
            self.core.channels = parse_channels(&info.channels);
        }
        self.core.online = info.online_status;
    }
}

/// Builder for [`Device`].
#[derive(Debug)]
pub struct DeviceBuilder {
    core: DeviceCore,
    role: Role,
    abilities: Abilities,
    units: Vec<Box<dyn CapabilityUnit>>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.core.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn device_type(mut self, device_type: impl Into<String>) -> Self {
        self.core.device_type = Some(device_type.into());
        self
    }

    #[must_use]
    pub fn firmware_version(mut self, version: impl Into<String>) -> Self {
        self.core.firmware_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn hardware_version(mut self, version: impl Into<String>) -> Self {
        self.core.hardware_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn online(mut self, online: OnlineStatus) -> Self {
        self.core.online = online;
        self
    }

    #[must_use]
    pub fn channels(mut self, channels: Vec<ChannelInfo>) -> Self {
        self.core.channels = channels;
        self
    }

    #[must_use]
    pub fn abilities(mut self, abilities: Abilities) -> Self {
        self.abilities = abilities;
        self
    }

    /// Make the device a hub with no subordinates yet.
    #[must_use]
    pub fn hub(mut self) -> Self {
        self.role = Role::Hub(HubState::default());
        self
    }

    /// Make the device a subordinate of `hub`. Its UUID becomes the hub's.
    #[must_use]
    pub fn subdevice(mut self, hub: DeviceUuid, id: SubdeviceId) -> Self {
        self.core.uuid = hub.clone();
        self.role = Role::Subdevice(SubdeviceLink { hub, id });
        self
    }

    /// Append a capability unit. Order is the order units see payloads in.
    #[must_use]
    pub fn unit(mut self, unit: impl CapabilityUnit) -> Self {
        self.units.push(Box::new(unit));
        self
    }

    /// Build the device.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyUuid`] if the UUID is empty.
    pub fn build(self) -> Result<Device, ValidationError> {
        if self.core.uuid.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyUuid);
        }
        let mut tags: BTreeSet<CapabilityTag> = self.units.iter().map(|unit| unit.tag()).collect();
        match &self.role {
            Role::Base => {}
            Role::Hub(_) => {
                tags.insert(CapabilityTag::Hub);
            }
            Role::Subdevice(_) => {
                tags.insert(CapabilityTag::Subdevice);
            }
        }
        Ok(Device {
            core: self.core,
            role: self.role,
            abilities: self.abilities,
            units: self.units,
            tags,
        })
    }
}
