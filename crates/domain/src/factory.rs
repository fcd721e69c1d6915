//! Device factory: picks capability units from reported abilities.

use crate::capability::{
    Electricity, GarageDoor, SubdeviceOnline, SystemAll, SystemOnline, TempHumSensor, ThermostatValve, Toggle, ToggleX,
};
use crate::channel::parse_channels;
use crate::device::{Abilities, Device, DeviceBuilder};
use crate::discovery::{HttpDeviceInfo, HttpSubdeviceInfo};
use crate::error::ValidationError;
use crate::namespace::Namespace;

fn supports(abilities: &Abilities, namespace: &Namespace) -> bool {
    abilities.contains_key(namespace.as_str())
}

/// Build a base or hub device from its discovery record and ability map.
///
/// A device reporting `Appliance.Hub.SubdeviceList` becomes a hub.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyUuid`] for a record without a UUID.
pub fn build_device(info: &HttpDeviceInfo, abilities: Abilities) -> Result<Device, ValidationError> {
    let mut builder = Device::builder(info.uuid.clone())
        .online(info.online_status)
        .channels(parse_channels(&info.channels));
    builder = with_identity(builder, info);

    if supports(&abilities, &Namespace::HubSubdeviceList) {
        builder = builder.hub();
    }
    if supports(&abilities, &Namespace::SystemAll) {
        builder = builder.unit(SystemAll);
    }
    if supports(&abilities, &Namespace::SystemOnline) {
        builder = builder.unit(SystemOnline);
    }
    if supports(&abilities, &Namespace::ControlToggleX) {
        builder = builder.unit(ToggleX::default());
    } else if supports(&abilities, &Namespace::ControlToggle) {
        builder = builder.unit(Toggle::default());
    }
    if supports(&abilities, &Namespace::GarageDoorState) {
        builder = builder.unit(GarageDoor::default());
    }
    if supports(&abilities, &Namespace::ControlElectricity) {
        builder = builder.unit(Electricity::default());
    }

    builder.abilities(abilities).build()
}

fn with_identity(mut builder: DeviceBuilder, info: &HttpDeviceInfo) -> DeviceBuilder {
    if let Some(name) = &info.dev_name {
        builder = builder.name(name.clone());
    }
    if let Some(device_type) = &info.device_type {
        builder = builder.device_type(device_type.clone());
    }
    if let Some(version) = &info.fmware_version {
        builder = builder.firmware_version(version.clone());
    }
    if let Some(version) = &info.hdware_version {
        builder = builder.hardware_version(version.clone());
    }
    builder
}

/// Build a subordinate of `hub`.
///
/// The subordinate type selects the specialised unit, provided the hub
/// reports the matching hub-family ability. Unknown types get a generic
/// subordinate that only tracks reachability.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyUuid`] when the hub has no UUID.
pub fn build_subdevice(info: &HttpSubdeviceInfo, hub: &Device) -> Result<Device, ValidationError> {
    let mut builder = Device::builder(hub.uuid().clone())
        .subdevice(hub.uuid().clone(), info.sub_device_id.clone())
        .unit(SubdeviceOnline);
    if let Some(name) = &info.sub_device_name {
        builder = builder.name(name.clone());
    }

    let kind = info.sub_device_type.as_deref().unwrap_or_default().to_ascii_lowercase();
    let hub_abilities = hub.abilities();
    match kind.as_str() {
        "ms100" | "ms100f" if supports(hub_abilities, &Namespace::HubSensorAll) => {
            builder = builder.unit(TempHumSensor::default());
        }
        "mts100" | "mts100v3" | "mts150" if supports(hub_abilities, &Namespace::HubMts100All) => {
            builder = builder.unit(ThermostatValve::default());
        }
        other => {
            tracing::warn!(
                hub = %hub.uuid(),
                subdevice = %info.sub_device_id,
                kind = other,
                "unsupported subdevice type, only reachability is tracked"
            );
        }
    }
    if !kind.is_empty() {
        builder = builder.device_type(kind);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityTag;
    use crate::device::RefreshRequest;
    use serde_json::json;

    fn abilities(namespaces: &[Namespace]) -> Abilities {
        namespaces
            .iter()
            .map(|namespace| (namespace.as_str().to_string(), json!({})))
            .collect()
    }

    fn hub() -> Device {
        build_device(
            &HttpDeviceInfo::new("hub", "msh300"),
            abilities(&[
                Namespace::SystemAll,
                Namespace::SystemOnline,
                Namespace::HubSubdeviceList,
                Namespace::HubSensorAll,
                Namespace::HubMts100All,
            ]),
        )
        .unwrap()
    }

    #[test]
    fn should_pick_units_from_abilities() {
        let mut info = HttpDeviceInfo::new("plug", "mss310");
        info.channels = vec![json!({})];
        let device = build_device(
            &info,
            abilities(&[
                Namespace::SystemAll,
                Namespace::SystemOnline,
                Namespace::ControlToggleX,
                Namespace::ControlToggle,
                Namespace::ControlElectricity,
            ]),
        )
        .unwrap();

        assert!(device.has_tag(CapabilityTag::ToggleX));
        assert!(!device.has_tag(CapabilityTag::Toggle));
        assert!(device.has_tag(CapabilityTag::Electricity));
        assert!(!device.is_hub());
        assert_eq!(device.channels().len(), 1);
        assert_eq!(device.device_type(), Some("mss310"));
    }

    #[test]
    fn should_build_hub_from_subdevice_list_ability() {
        let hub = hub();
        assert!(hub.is_hub());
        assert!(hub.has_tag(CapabilityTag::Hub));
    }

    #[test]
    fn should_build_sensor_subdevice() {
        let hub = hub();
        let mut info = HttpSubdeviceInfo::new("SD1", "ms100");
        info.sub_device_name = Some("Bedroom".to_string());
        let device = build_subdevice(&info, &hub).unwrap();

        assert_eq!(device.internal_id().as_str(), "#BASE:hub#SUB:SD1");
        assert_eq!(device.name(), "Bedroom");
        assert!(device.has_tag(CapabilityTag::Sensor));
        assert!(matches!(device.refresh_request(), RefreshRequest::ViaHub(_)));
    }

    #[test]
    fn should_build_valve_subdevice() {
        let device = build_subdevice(&HttpSubdeviceInfo::new("SD2", "mts100v3"), &hub()).unwrap();
        assert!(device.has_tag(CapabilityTag::Valve));
    }

    #[test]
    fn should_fall_back_to_generic_subdevice() {
        let device = build_subdevice(&HttpSubdeviceInfo::new("SD3", "ms200"), &hub()).unwrap();
        assert!(device.has_tag(CapabilityTag::SubdeviceOnline));
        assert!(!device.has_tag(CapabilityTag::Sensor));
        assert_eq!(device.refresh_request(), RefreshRequest::MissingNamespace);
    }
}
