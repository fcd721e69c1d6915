//! `Appliance.System.*` units.

use serde_json::Value;

use super::{CapabilityTag, CapabilityUnit, DeviceCore, path};
use crate::namespace::Namespace;
use crate::online::OnlineStatus;

/// Answers the full `Appliance.System.All` poll and keeps the firmware and
/// hardware versions current.
#[derive(Debug, Default)]
pub struct SystemAll;

impl CapabilityUnit for SystemAll {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::SystemAll
    }

    fn handle_update(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::SystemAll {
            return false;
        }
        let system = path(payload, &["all", "system"]);
        if let Some(version) = system
            .and_then(|system| path(system, &["firmware", "version"]))
            .and_then(Value::as_str)
        {
            core.firmware_version = Some(version.to_string());
        }
        if let Some(version) = system
            .and_then(|system| path(system, &["hardware", "version"]))
            .and_then(Value::as_str)
        {
            core.hardware_version = Some(version.to_string());
        }
        true
    }

    fn refresh_namespace(&self) -> Option<Namespace> {
        Some(Namespace::SystemAll)
    }
}

/// Tracks reachability pushed on `Appliance.System.Online`.
#[derive(Debug, Default)]
pub struct SystemOnline;

impl CapabilityUnit for SystemOnline {
    fn tag(&self) -> CapabilityTag {
        CapabilityTag::Online
    }

    fn handle_push(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::SystemOnline {
            return false;
        }
        let Some(online) = payload.get("online") else {
            tracing::error!(uuid = %core.uuid, "online push without `online` member");
            return false;
        };
        core.online = OnlineStatus::from_json(online.get("status"));
        true
    }

    fn handle_update(&mut self, core: &mut DeviceCore, namespace: &Namespace, payload: &Value) -> bool {
        if *namespace != Namespace::SystemAll {
            return false;
        }
        match path(payload, &["all", "system", "online", "status"]) {
            Some(status) => core.online = OnlineStatus::from_json(Some(status)),
            None => tracing::debug!(uuid = %core.uuid, "full poll without online status"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::DeviceUuid;
    use serde_json::json;

    fn core() -> DeviceCore {
        DeviceCore::new(DeviceUuid::new("1911"))
    }

    #[test]
    fn should_set_online_from_push() {
        let mut core = core();
        let handled = SystemOnline.handle_push(
            &mut core,
            &Namespace::SystemOnline,
            &json!({"online": {"status": 1}}),
        );
        assert!(handled);
        assert_eq!(core.online, OnlineStatus::Online);
    }

    #[test]
    fn should_ignore_online_push_without_member() {
        let mut core = core();
        assert!(!SystemOnline.handle_push(&mut core, &Namespace::SystemOnline, &json!({})));
        assert_eq!(core.online, OnlineStatus::Unknown);
    }

    #[test]
    fn should_ignore_other_namespaces() {
        let mut core = core();
        assert!(!SystemOnline.handle_push(
            &mut core,
            &Namespace::ControlToggleX,
            &json!({"online": {"status": 1}})
        ));
    }

    #[test]
    fn should_read_versions_and_status_from_full_poll() {
        let payload = json!({"all": {"system": {
            "firmware": {"version": "2.1.2"},
            "hardware": {"version": "2.0.0"},
            "online": {"status": 2}
        }}});
        let mut core = core();
        assert!(SystemAll.handle_update(&mut core, &Namespace::SystemAll, &payload));
        assert!(SystemOnline.handle_update(&mut core, &Namespace::SystemAll, &payload));
        assert_eq!(core.firmware_version.as_deref(), Some("2.1.2"));
        assert_eq!(core.hardware_version.as_deref(), Some("2.0.0"));
        assert_eq!(core.online, OnlineStatus::Offline);
    }

    #[test]
    fn should_handle_full_poll_without_online_status() {
        let mut core = core();
        assert!(SystemOnline.handle_update(&mut core, &Namespace::SystemAll, &json!({"all": {}})));
        assert_eq!(core.online, OnlineStatus::Unknown);
    }
}
