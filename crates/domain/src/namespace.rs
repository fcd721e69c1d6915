//! Protocol namespaces: the semantic category of a request or push payload.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_namespaces {
    ($($variant:ident => $wire:literal,)*) => {
        /// A protocol namespace such as `Appliance.System.All`.
        ///
        /// Namespaces this library does not know about are kept verbatim in
        /// [`Namespace::Other`] so they can still be routed and logged.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum Namespace {
            $(
                #[doc = concat!("`", $wire, "`")]
                $variant,
            )*
            /// Any namespace not listed above.
            Other(String),
        }

        impl Namespace {
            /// Wire representation of the namespace.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)*
                    Self::Other(raw) => raw,
                }
            }
        }

        impl From<&str> for Namespace {
            fn from(value: &str) -> Self {
                match value {
                    $($wire => Self::$variant,)*
                    other => Self::Other(other.to_string()),
                }
            }
        }
    };
}

define_namespaces! {
    SystemAll => "Appliance.System.All",
    SystemAbility => "Appliance.System.Ability",
    SystemOnline => "Appliance.System.Online",
    ControlToggle => "Appliance.Control.Toggle",
    ControlToggleX => "Appliance.Control.ToggleX",
    ControlElectricity => "Appliance.Control.Electricity",
    ControlBind => "Appliance.Control.Bind",
    ControlUnbind => "Appliance.Control.Unbind",
    GarageDoorState => "Appliance.GarageDoor.State",
    HubOnline => "Appliance.Hub.Online",
    HubToggleX => "Appliance.Hub.ToggleX",
    HubSubdeviceList => "Appliance.Hub.SubdeviceList",
    HubSensorAll => "Appliance.Hub.Sensor.All",
    HubSensorTempHum => "Appliance.Hub.Sensor.TempHum",
    HubSensorAlert => "Appliance.Hub.Sensor.Alert",
    HubMts100All => "Appliance.Hub.Mts100.All",
    HubMts100Mode => "Appliance.Hub.Mts100.Mode",
    HubMts100Temperature => "Appliance.Hub.Mts100.Temperature",
}

impl Namespace {
    /// Whether this namespace belongs to the hub family, whose payloads carry
    /// one entry per subordinate device.
    #[must_use]
    pub fn is_hub_family(&self) -> bool {
        self.as_str().starts_with("Appliance.Hub.")
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        match value {
            Namespace::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
