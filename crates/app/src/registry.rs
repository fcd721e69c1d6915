//! Device registry: owns every enrolled device.
//!
//! Handles are `Arc<Mutex<Device>>`. The registry never holds two device
//! locks at once, and never takes its own map lock while a device lock is
//! held by the same code path.

use std::collections::{BTreeSet, HashMap};
use std::sync::{MutexGuard, PoisonError, RwLock};

use fleetlink_domain::capability::CapabilityTag;
use fleetlink_domain::device::{Device, DeviceHandle};
use fleetlink_domain::error::{InvariantError, NotFoundError};
use fleetlink_domain::id::{DeviceUuid, InternalId};
use fleetlink_domain::online::OnlineStatus;

/// Lock a device, recovering from a poisoned mutex.
pub fn lock_device(handle: &DeviceHandle) -> MutexGuard<'_, Device> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multi-predicate lookup. Every set field must match (logical AND); the
/// default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub uuids: Option<BTreeSet<DeviceUuid>>,
    pub internal_ids: Option<BTreeSet<InternalId>>,
    pub device_type: Option<String>,
    pub online_status: Option<OnlineStatus>,
    pub name: Option<String>,
    pub tag: Option<CapabilityTag>,
}

impl DeviceFilter {
    #[must_use]
    pub fn with_uuid(mut self, uuid: DeviceUuid) -> Self {
        self.uuids.get_or_insert_with(BTreeSet::new).insert(uuid);
        self
    }

    #[must_use]
    pub fn with_internal_id(mut self, id: InternalId) -> Self {
        self.internal_ids.get_or_insert_with(BTreeSet::new).insert(id);
        self
    }

    #[must_use]
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    #[must_use]
    pub fn with_online_status(mut self, status: OnlineStatus) -> Self {
        self.online_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: CapabilityTag) -> Self {
        self.tag = Some(tag);
        self
    }

    fn matches_static(&self, device: &Device) -> bool {
        self.uuids.as_ref().is_none_or(|uuids| uuids.contains(device.uuid()))
            && self
                .internal_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&device.internal_id()))
            && self
                .device_type
                .as_deref()
                .is_none_or(|device_type| device.device_type() == Some(device_type))
            && self.name.as_deref().is_none_or(|name| device.name() == name)
            && self.tag.is_none_or(|tag| device.has_tag(tag))
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<InternalId, DeviceHandle>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a device under its internal id.
    ///
    /// Returns `None` (and logs) when a device with the same id is already
    /// enrolled; the existing entry is kept.
    pub fn enroll(&self, device: Device) -> Option<DeviceHandle> {
        let id = device.internal_id();
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.contains_key(&id) {
            tracing::warn!(internal_id = %id, "device already enrolled, skipping");
            return None;
        }
        tracing::info!(internal_id = %id, name = device.name(), "enrolled device");
        let handle = DeviceHandle::new(std::sync::Mutex::new(device));
        devices.insert(id, DeviceHandle::clone(&handle));
        Some(handle)
    }

    /// Remove a device. Relinquishing a hub also removes its subordinates.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when nothing is enrolled under `id`.
    pub fn relinquish(&self, id: &InternalId) -> Result<DeviceHandle, NotFoundError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let handle = devices.remove(id).ok_or_else(|| NotFoundError {
            entity: "Device",
            id: id.to_string(),
        })?;
        devices.retain(|sub_id, _| {
            let subordinate = sub_id.is_subdevice_of(id);
            if subordinate {
                tracing::info!(internal_id = %sub_id, "relinquished subdevice");
            }
            !subordinate
        });
        drop(devices);
        tracing::info!(internal_id = %id, "relinquished device");
        Ok(handle)
    }

    #[must_use]
    pub fn lookup_by_id(&self, id: &InternalId) -> Option<DeviceHandle> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// The base or hub device answering to `uuid`.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::AmbiguousUuid`] when more than one
    /// non-subordinate device carries the UUID.
    pub fn lookup_base_by_uuid(&self, uuid: &DeviceUuid) -> Result<Option<DeviceHandle>, InvariantError> {
        let mut matches: Vec<DeviceHandle> = self
            .snapshot()
            .into_iter()
            .filter(|handle| {
                let device = lock_device(handle);
                device.uuid() == uuid && device.subdevice_link().is_none()
            })
            .collect();
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            count => Err(InvariantError::AmbiguousUuid {
                uuid: uuid.clone(),
                count,
            }),
        }
    }

    /// Every device matching `filter`.
    #[must_use]
    pub fn find(&self, filter: &DeviceFilter) -> Vec<DeviceHandle> {
        self.snapshot()
            .into_iter()
            .filter(|handle| filter.matches_static(&lock_device(handle)))
            .filter(|handle| {
                filter
                    .online_status
                    .is_none_or(|status| self.online_status(handle) == status)
            })
            .collect()
    }

    /// Effective status of a device, resolving subordinates through their hub.
    #[must_use]
    pub fn online_status(&self, handle: &DeviceHandle) -> OnlineStatus {
        let hub = lock_device(handle).subdevice_link().map(|link| link.hub.clone());
        let hub_status = hub.and_then(|uuid| {
            self.lookup_by_id(&InternalId::base(&uuid))
                .map(|hub| lock_device(&hub).online_status())
        });
        lock_device(handle).effective_online_status(hub_status)
    }

    /// Every enrolled device, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceHandle> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Remove everything, returning what was enrolled.
    pub fn clear(&self) -> Vec<DeviceHandle> {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
