//! Static discovery: serves the device list from the configuration file.

use std::collections::HashMap;

use serde_json::json;

use fleetlink_app::ports::DiscoveryApi;
use fleetlink_domain::discovery::{HttpDeviceInfo, HttpSubdeviceInfo};
use fleetlink_domain::error::FleetError;
use fleetlink_domain::id::DeviceUuid;
use fleetlink_domain::online::OnlineStatus;

use crate::config::{InventoryConfig, InventoryDevice};

/// [`DiscoveryApi`] backed by `[[inventory.devices]]`.
#[derive(Debug, Default)]
pub struct StaticInventory {
    devices: Vec<HttpDeviceInfo>,
    subdevices: HashMap<DeviceUuid, Vec<HttpSubdeviceInfo>>,
}

impl StaticInventory {
    #[must_use]
    pub fn from_config(config: &InventoryConfig) -> Self {
        let mut inventory = Self::default();
        for device in &config.devices {
            let info = device_info(device);
            let subdevices = device
                .subdevices
                .iter()
                .map(|sub| {
                    let mut info = HttpSubdeviceInfo::new(sub.id.clone(), sub.kind.clone());
                    info.sub_device_name.clone_from(&sub.name);
                    info
                })
                .collect::<Vec<_>>();
            if !subdevices.is_empty() {
                inventory.subdevices.insert(info.uuid.clone(), subdevices);
            }
            inventory.devices.push(info);
        }
        inventory
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn device_info(device: &InventoryDevice) -> HttpDeviceInfo {
    HttpDeviceInfo {
        uuid: DeviceUuid::new(device.uuid.clone()),
        dev_name: device.name.clone(),
        device_type: device.device_type.clone(),
        fmware_version: device.firmware_version.clone(),
        hdware_version: device.hardware_version.clone(),
        online_status: if device.online {
            OnlineStatus::Online
        } else {
            OnlineStatus::Offline
        },
        channels: vec![json!({}); device.channels],
        bind_time: None,
    }
}

impl DiscoveryApi for StaticInventory {
    async fn list_devices(&self) -> Result<Vec<HttpDeviceInfo>, FleetError> {
        Ok(self.devices.clone())
    }

    async fn list_subdevices(&self, hub: &DeviceUuid) -> Result<Vec<HttpSubdeviceInfo>, FleetError> {
        Ok(self.subdevices.get(hub).cloned().unwrap_or_default())
    }
}
