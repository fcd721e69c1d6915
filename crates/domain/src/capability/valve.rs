//! Thermostatic radiator valve hosted by a hub (MTS100 family).

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};

use super::{AckEffect, CapabilityTag, CapabilityUnit, Command, DeviceCore, deci, merge_entry};
use crate::error::ValidationError;
use crate::id::{DeviceUuid, SubdeviceId};
use crate::message::Method;
use crate::namespace::Namespace;
use crate::online::OnlineStatus;

/// Operating mode of the valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveMode {
    Custom,
    Comfort,
    Economy,
    Schedule,
    Auto,
}

impl ValveMode {
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Custom => 0,
            Self::Comfort => 1,
            Self::Economy => 2,
            Self::Schedule => 3,
            Self::Auto => 4,
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Custom),
            1 => Some(Self::Comfort),
            2 => Some(Self::Economy),
            3 => Some(Self::Schedule),
            4 => Some(Self::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for ValveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Custom => "custom",
            Self::Comfort => "comfort",
            Self::Economy => "economy",
            Self::Schedule => "schedule",
            Self::Auto => "auto",
        })
    }
}

/// Temperature presets that can be reprogrammed.
const PRESETS: [&str; 4] = ["custom", "comfort", "economy", "away"];

#[derive(Debug, Default)]
pub struct ThermostatValve {
    togglex: Map<String, Value>,
    mode: Map<String, Value>,
    temperature: Map<String, Value>,
    schedule_b_mode: Option<i64>,
    last_active_time: Option<i64>,
}

impl ThermostatValve {
    #[must_use]
    pub fn is_on(&self) -> Option<bool> {
        self.togglex.get("onoff").and_then(Value::as_i64).map(|v| v == 1)
    }

    #[must_use]
    pub fn mode(&self) -> Option<ValveMode> {
        self.mode.get("state").and_then(Value::as_i64).and_then(ValveMode::from_code)
    }

    /// Room temperature measured by the valve, in °C.
    #[must_use]
    pub fn ambient_temperature(&self) -> Option<f64> {
        deci(&self.temperature, "room")
    }

    /// Temperature the valve is currently regulating towards, in °C.
    #[must_use]
    pub fn target_temperature(&self) -> Option<f64> {
        deci(&self.temperature, "currentSet")
    }

    #[must_use]
    pub fn min_temperature(&self) -> Option<f64> {
        deci(&self.temperature, "min")
    }

    #[must_use]
    pub fn max_temperature(&self) -> Option<f64> {
        deci(&self.temperature, "max")
    }

    /// Programmed value of a preset (`custom`, `comfort`, `economy`, `away`).
    #[must_use]
    pub fn preset_temperature(&self, preset: &str) -> Option<f64> {
        deci(&self.temperature, preset)
    }

    #[must_use]
    pub fn is_heating(&self) -> Option<bool> {
        self.temperature.get("heating").and_then(Value::as_i64).map(|v| v == 1)
    }

    #[must_use]
    pub fn is_window_open(&self) -> Option<bool> {
        self.temperature.get("openWindow").and_then(Value::as_i64).map(|v| v == 1)
    }

    #[must_use]
    pub fn schedule_b_mode(&self) -> Option<i64> {
        self.schedule_b_mode
    }

    #[must_use]
    pub fn last_active_time(&self) -> Option<i64> {
        self.last_active_time
    }

    #[must_use]
    pub fn toggle_command(&self, hub: &DeviceUuid, id: &SubdeviceId, on: bool) -> Command {
        let onoff = i32::from(on);
        hub_set(
            hub,
            Namespace::HubToggleX,
            json!({"togglex": [{"id": id, "onoff": onoff, "channel": 0}]}),
            json!({"id": id, "onoff": onoff, "channel": 0}),
        )
    }

    #[must_use]
    pub fn mode_command(&self, hub: &DeviceUuid, id: &SubdeviceId, mode: ValveMode) -> Command {
        hub_set(
            hub,
            Namespace::HubMts100Mode,
            json!({"mode": [{"id": id, "state": mode.code()}]}),
            json!({"id": id, "state": mode.code()}),
        )
    }

    /// Set the regulation target, in °C.
    #[must_use]
    pub fn target_temperature_command(&self, hub: &DeviceUuid, id: &SubdeviceId, celsius: f64) -> Command {
        let raw = to_deci(celsius);
        hub_set(
            hub,
            Namespace::HubMts100Temperature,
            json!({"temperature": [{"id": id, "custom": raw}]}),
            json!({"id": id, "currentSet": raw}),
        )
    }

    /// Reprogram one preset, in °C.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnsupportedPreset`] for a preset outside
    /// `custom`, `comfort`, `economy` and `away`.
    pub fn preset_temperature_command(
        &self,
        hub: &DeviceUuid,
        id: &SubdeviceId,
        preset: &str,
        celsius: f64,
    ) -> Result<Command, ValidationError> {
        if !PRESETS.contains(&preset) {
            return Err(ValidationError::UnsupportedPreset(preset.to_string()));
        }
        let raw = to_deci(celsius);
        Ok(hub_set(
            hub,
            Namespace::HubMts100Temperature,
            json!({"temperature": [{"id": id, preset: raw}]}),
            json!({"id": id, preset: raw}),
        ))
    }

    fn apply_all(&mut self, core: &mut DeviceCore, entry: &Value) {
        if let Some(mode) = entry.get("scheduleBMode").and_then(Value::as_i64) {
            self.schedule_b_mode = Some(mode);
        }
        if let Some(online) = entry.get("online") {
            core.online = OnlineStatus::from_json(online.get("status"));
            if let Some(at) = online.get("lastActiveTime").and_then(Value::as_i64) {
                self.last_active_time = Some(at);
            }
        }
        if let Some(togglex) = entry.get("togglex") {
            merge_entry(&mut self.togglex, togglex);
        }
        if let Some(mode) = entry.get("mode") {
            merge_entry(&mut self.mode, mode);
        }
        if let Some(temperature) = entry.get("temperature") {
            merge_entry(&mut self.temperature, temperature);
        }
    }
}

impl CapabilityUnit for ThermostatValve {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::Valve
    }

    fn handle_push(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        match namespace {
            Namespace::HubMts100All => self.apply_all(core, payload),
            Namespace::HubToggleX => merge_entry(&mut self.togglex, payload),
            Namespace::HubMts100Mode => merge_entry(&mut self.mode, payload),
            Namespace::HubMts100Temperature => merge_entry(&mut self.temperature, payload),
            _ => return false,
        }
        true
    }

    fn refresh_namespace(&self) -> Option<Namespace> {
        Some(Namespace::HubMts100All)
    }
}

fn hub_set(hub: &DeviceUuid, namespace: Namespace, payload: Value, echo: Value) -> Command {
    Command {
        target: hub.clone(),
        method: Method::Set,
        namespace,
        payload,
        on_ack: AckEffect::Push(echo),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_deci(celsius: f64) -> i64 {
    (celsius * 10.0).round() as i64
}

impl FromStr for ValveMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "custom" => Ok(Self::Custom),
            "comfort" => Ok(Self::Comfort),
            "economy" => Ok(Self::Economy),
            "schedule" => Ok(Self::Schedule),
            "auto" => Ok(Self::Auto),
            other => Err(ValidationError::UnsupportedPreset(other.to_string())),
        }
    }
}
