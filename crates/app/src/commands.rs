//! Device commands issued through the [`Manager`].
//!
//! Each command is composed under the device lock, published with the lock
//! released, and its acknowledgement applied through
//! [`Device::acknowledge`](fleetlink_domain::device::Device::acknowledge).

use fleetlink_domain::capability::{
    Command, Electricity, GarageDoor, PowerInfo, ThermostatValve, Toggle, ToggleX, ValveMode,
};
use fleetlink_domain::device::{Device, DeviceHandle, SubdeviceLink};
use fleetlink_domain::error::{FleetError, ProtocolError, ValidationError};

use crate::manager::Manager;
use crate::ports::{DiscoveryApi, Transport};
use crate::registry::lock_device;

fn check_channel(device: &Device, channel: usize) -> Result<(), FleetError> {
    // Devices listed without channel data accept any index.
    if !device.channels().is_empty() {
        device.lookup_channel(channel)?;
    }
    Ok(())
}

fn valve_command(
    device: &Device,
    compose: impl FnOnce(&ThermostatValve, &SubdeviceLink) -> Result<Command, ValidationError>,
) -> Result<Command, FleetError> {
    let valve = device.require::<ThermostatValve>("thermostat valve")?;
    let link = device
        .subdevice_link()
        .ok_or_else(|| ValidationError::UnsupportedCapability {
            uuid: device.uuid().clone(),
            capability: "thermostat valve",
        })?;
    Ok(compose(valve, link)?)
}

fn switch_command(device: &Device, channel: usize, on: bool) -> Result<Command, FleetError> {
    if let Some(unit) = device.unit::<ToggleX>() {
        check_channel(device, channel)?;
        return Ok(unit.command(device.uuid(), channel, on));
    }
    if let Some(unit) = device.unit::<Toggle>() {
        check_channel(device, channel)?;
        return Ok(unit.command(device.uuid(), channel, on));
    }
    if device.unit::<ThermostatValve>().is_some() {
        return valve_command(device, |valve, link| Ok(valve.toggle_command(&link.hub, &link.id, on)));
    }
    Err(ValidationError::UnsupportedCapability {
        uuid: device.uuid().clone(),
        capability: "on/off switching",
    }
    .into())
}

fn switch_state(device: &Device, channel: usize) -> Option<bool> {
    device
        .unit::<ToggleX>()
        .and_then(|unit| unit.is_on(channel))
        .or_else(|| device.unit::<Toggle>().and_then(|unit| unit.is_on(channel)))
        .or_else(|| device.unit::<ThermostatValve>().and_then(ThermostatValve::is_on))
}

impl<T: Transport, D: DiscoveryApi> Manager<T, D> {
    async fn issue(
        &self,
        handle: &DeviceHandle,
        compose: impl FnOnce(&Device) -> Result<Command, FleetError>,
    ) -> Result<serde_json::Value, FleetError> {
        let command = compose(&lock_device(handle))?;
        self.apply(handle, &command).await
    }

    /// Switch `channel` on or off.
    ///
    /// Works for multi-channel switches, legacy single toggles and
    /// thermostat valves (which ignore `channel`).
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnsupportedCapability`] when the device cannot be
    /// switched, [`NotFoundError`](fleetlink_domain::error::NotFoundError)
    /// for an unknown channel, or any transport failure.
    #[tracing::instrument(skip(self, handle))]
    pub async fn set_switch(&self, handle: &DeviceHandle, channel: usize, on: bool) -> Result<(), FleetError> {
        self.issue(handle, |device| switch_command(device, channel, on)).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`set_switch`](Self::set_switch).
    pub async fn turn_on(&self, handle: &DeviceHandle, channel: usize) -> Result<(), FleetError> {
        self.set_switch(handle, channel, true).await
    }

    /// # Errors
    ///
    /// See [`set_switch`](Self::set_switch).
    pub async fn turn_off(&self, handle: &DeviceHandle, channel: usize) -> Result<(), FleetError> {
        self.set_switch(handle, channel, false).await
    }

    /// Flip `channel`; an unknown state is treated as off.
    ///
    /// # Errors
    ///
    /// See [`set_switch`](Self::set_switch).
    pub async fn toggle(&self, handle: &DeviceHandle, channel: usize) -> Result<(), FleetError> {
        let on = switch_state(&lock_device(handle), channel).unwrap_or(false);
        self.set_switch(handle, channel, !on).await
    }

    /// Open or close the door on `channel`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnsupportedCapability`] for devices without a
    /// garage door, or any transport failure.
    #[tracing::instrument(skip(self, handle))]
    pub async fn set_garage_door(&self, handle: &DeviceHandle, channel: usize, open: bool) -> Result<(), FleetError> {
        self.issue(handle, |device| {
            let door = device.require::<GarageDoor>("garage door")?;
            check_channel(device, channel)?;
            Ok(door.command(device.uuid(), channel, open))
        })
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`set_garage_door`](Self::set_garage_door).
    pub async fn open_garage_door(&self, handle: &DeviceHandle, channel: usize) -> Result<(), FleetError> {
        self.set_garage_door(handle, channel, true).await
    }

    /// # Errors
    ///
    /// See [`set_garage_door`](Self::set_garage_door).
    pub async fn close_garage_door(&self, handle: &DeviceHandle, channel: usize) -> Result<(), FleetError> {
        self.set_garage_door(handle, channel, false).await
    }

    /// Poll the power meter of `channel` and return the fresh sample.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnsupportedCapability`] for devices without a
    /// meter, [`FleetError::Protocol`] when the answer carries no sample, or
    /// any transport failure.
    #[tracing::instrument(skip(self, handle))]
    pub async fn read_electricity(&self, handle: &DeviceHandle, channel: usize) -> Result<PowerInfo, FleetError> {
        let response = self
            .issue(handle, |device| {
                let meter = device.require::<Electricity>("electricity metering")?;
                check_channel(device, channel)?;
                Ok(meter.command(device.uuid(), channel))
            })
            .await?;
        lock_device(handle)
            .unit::<Electricity>()
            .and_then(|meter| meter.last_sample(channel))
            .ok_or(FleetError::Protocol(ProtocolError { payload: response }))
    }

    /// # Errors
    ///
    /// [`ValidationError::UnsupportedCapability`] for anything but a
    /// thermostat valve, or any transport failure.
    #[tracing::instrument(skip(self, handle))]
    pub async fn set_valve_mode(&self, handle: &DeviceHandle, mode: ValveMode) -> Result<(), FleetError> {
        self.issue(handle, |device| {
            valve_command(device, |valve, link| Ok(valve.mode_command(&link.hub, &link.id, mode)))
        })
        .await?;
        Ok(())
    }

    /// Set the custom target temperature, in °C.
    ///
    /// # Errors
    ///
    /// See [`set_valve_mode`](Self::set_valve_mode).
    #[tracing::instrument(skip(self, handle))]
    pub async fn set_target_temperature(&self, handle: &DeviceHandle, celsius: f64) -> Result<(), FleetError> {
        self.issue(handle, |device| {
            valve_command(device, |valve, link| {
                Ok(valve.target_temperature_command(&link.hub, &link.id, celsius))
            })
        })
        .await?;
        Ok(())
    }

    /// Reprogram one preset, in °C.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UnsupportedPreset`] for an unknown preset, plus
    /// the errors of [`set_valve_mode`](Self::set_valve_mode).
    #[tracing::instrument(skip(self, handle))]
    pub async fn set_preset_temperature(
        &self,
        handle: &DeviceHandle,
        preset: &str,
        celsius: f64,
    ) -> Result<(), FleetError> {
        self.issue(handle, |device| {
            valve_command(device, |valve, link| {
                valve.preset_temperature_command(&link.hub, &link.id, preset, celsius)
            })
        })
        .await?;
        Ok(())
    }
}
