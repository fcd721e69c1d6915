//! Instant power metering.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use super::{AckEffect, CapabilityTag, CapabilityUnit, Command, DeviceCore, channel_of};
use crate::id::DeviceUuid;
use crate::message::Method;
use crate::namespace::Namespace;

/// One metering sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerInfo {
    pub current_ampere: f64,
    pub voltage_volts: f64,
    pub power_watts: f64,
}

impl PowerInfo {
    /// Convert the raw vendor units (mA, dV, mW).
    fn from_raw(entry: &Value) -> Option<Self> {
        let read = |key: &str| entry.get(key).and_then(Value::as_f64);
        Some(Self {
            current_ampere: read("current")? / 1000.0,
            voltage_volts: read("voltage")? / 10.0,
            power_watts: read("power")? / 1000.0,
        })
    }
}

/// Last metering sample per channel, refreshed by polling
/// `Appliance.Control.Electricity`.
#[derive(Debug, Default)]
pub struct Electricity {
    last: BTreeMap<usize, PowerInfo>,
}

impl Electricity {
    #[must_use]
    pub fn last_sample(&self, channel: usize) -> Option<PowerInfo> {
        self.last.get(&channel).copied()
    }

    /// Poll the meter of `channel`.
    #[must_use]
    pub fn command(&self, target: &DeviceUuid, channel: usize) -> Command {
        Command {
            target: target.clone(),
            method: Method::Get,
            namespace: Namespace::ControlElectricity,
            payload: json!({"electricity": {"channel": channel}}),
            on_ack: AckEffect::Update,
        }
    }
}

impl CapabilityUnit for Electricity {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::Electricity
    }

    fn handle_update(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::ControlElectricity {
            return false;
        }
        let Some(entry) = payload.get("electricity") else {
            return false;
        };
        match PowerInfo::from_raw(entry) {
            Some(info) => {
                self.last.insert(channel_of(entry), info);
                true
            }
            None => {
                tracing::warn!(uuid = %core.uuid, "incomplete electricity sample");
                false
            }
        }
    }
}
