//! Temperature/humidity sensor hosted by a hub (MS100 family).

use serde::Serialize;
use serde_json::{Map, Value};

use super::{CapabilityTag, CapabilityUnit, DeviceCore, deci, merge_entry};
use crate::namespace::Namespace;
use crate::online::OnlineStatus;
use crate::time::{self, Timestamp};

/// One historical sample reported on `Appliance.Hub.Sensor.TempHum`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempHumSample {
    pub temperature: f64,
    pub humidity: f64,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl TempHumSample {
    fn from_raw(raw: &Value) -> Option<Self> {
        let items = raw.as_array()?;
        let number = |index: usize| items.get(index).and_then(Value::as_f64);
        let instant = |index: usize| {
            items
                .get(index)
                .and_then(Value::as_i64)
                .and_then(time::from_unix_seconds)
        };
        Some(Self {
            temperature: number(0)? / 10.0,
            humidity: number(1)? / 10.0,
            from: instant(2),
            to: instant(3),
        })
    }
}

#[derive(Debug, Default)]
pub struct TempHumSensor {
    temperature: Map<String, Value>,
    humidity: Map<String, Value>,
    synced_at: Option<i64>,
    latest_temperature: Option<f64>,
    latest_humidity: Option<f64>,
    samples: Vec<TempHumSample>,
}

impl TempHumSensor {
    /// Most recent temperature in °C.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.latest_temperature.or_else(|| deci(&self.temperature, "latest"))
    }

    /// Most recent relative humidity in %.
    #[must_use]
    pub fn humidity(&self) -> Option<f64> {
        self.latest_humidity.or_else(|| deci(&self.humidity, "latest"))
    }

    #[must_use]
    pub fn min_temperature(&self) -> Option<f64> {
        deci(&self.temperature, "min")
    }

    #[must_use]
    pub fn max_temperature(&self) -> Option<f64> {
        deci(&self.temperature, "max")
    }

    /// When the latest sample was taken.
    #[must_use]
    pub fn sampled_at(&self) -> Option<Timestamp> {
        self.last_sample_time().and_then(time::from_unix_seconds)
    }

    /// Newest of the `Sensor.All` sample time and the last `TempHum` sync.
    fn last_sample_time(&self) -> Option<i64> {
        let polled = self.temperature.get("latestSampleTime").and_then(Value::as_i64);
        self.synced_at.max(polled)
    }

    #[must_use]
    pub fn samples(&self) -> &[TempHumSample] {
        &self.samples
    }

    fn apply_all(&mut self, core: &mut DeviceCore, payload: &Value) {
        if let Some(online) = payload.get("online") {
            core.online = OnlineStatus::from_json(online.get("status"));
        }
        if let Some(temperature) = payload.get("temperature") {
            merge_entry(&mut self.temperature, temperature);
            self.latest_temperature = None;
        }
        if let Some(humidity) = payload.get("humidity") {
            merge_entry(&mut self.humidity, humidity);
            self.latest_humidity = None;
        }
    }

    fn apply_temp_hum(&mut self, payload: &Value) {
        let synced = payload.get("syncedTime").and_then(Value::as_i64);
        // Older syncs arriving late must not overwrite a newer reading.
        let stale = matches!((synced, self.last_sample_time()), (Some(new), Some(old)) if new < old);
        if !stale {
            if let Some(value) = payload.get("latestTemperature").and_then(Value::as_f64) {
                self.latest_temperature = Some(value / 10.0);
            }
            if let Some(value) = payload.get("latestHumidity").and_then(Value::as_f64) {
                self.latest_humidity = Some(value / 10.0);
            }
            if synced.is_some() {
                self.synced_at = synced;
            }
        }
        if let Some(samples) = payload.get("sample").and_then(Value::as_array) {
            self.samples = samples.iter().filter_map(TempHumSample::from_raw).collect();
        }
    }
}

impl CapabilityUnit for TempHumSensor {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::Sensor
    }

    fn handle_push(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        match namespace {
            Namespace::HubSensorAll => {
                self.apply_all(core, payload);
                true
            }
            Namespace::HubSensorTempHum => {
                self.apply_temp_hum(payload);
                true
            }
            _ => false,
        }
    }

    fn refresh_namespace(&self) -> Option<Namespace> {
        Some(Namespace::HubSensorAll)
    }
}
