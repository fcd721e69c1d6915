//! Broker topic naming.

use crate::id::DeviceUuid;

/// Topic a device listens on for requests.
#[must_use]
pub fn device_request_topic(uuid: &DeviceUuid) -> String {
    format!("/appliance/{uuid}/subscribe")
}

/// Topic acknowledgements for this client instance are delivered to.
#[must_use]
pub fn client_response_topic(user_id: &str, app_id: &str) -> String {
    format!("/app/{user_id}-{app_id}/subscribe")
}

/// Topic carrying push notifications from every device the user owns.
#[must_use]
pub fn user_topic(user_id: &str) -> String {
    format!("/app/{user_id}/subscribe")
}

/// Extract the originating device UUID from a push `from` header
/// (`/appliance/<uuid>/publish`).
#[must_use]
pub fn device_uuid_from_push(from: &str) -> Option<DeviceUuid> {
    let mut segments = from.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(""), Some("appliance"), Some(uuid)) if !uuid.is_empty() => {
            Some(DeviceUuid::new(uuid))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_topics() {
        assert_eq!(
            device_request_topic(&DeviceUuid::new("abc")),
            "/appliance/abc/subscribe"
        );
        assert_eq!(client_response_topic("42", "app"), "/app/42-app/subscribe");
        assert_eq!(user_topic("42"), "/app/42/subscribe");
    }

    #[test]
    fn should_extract_uuid_from_push_origin() {
        assert_eq!(
            device_uuid_from_push("/appliance/1911/publish"),
            Some(DeviceUuid::new("1911"))
        );
    }

    #[test]
    fn should_reject_non_device_origin() {
        assert_eq!(device_uuid_from_push("/app/42/subscribe"), None);
        assert_eq!(device_uuid_from_push("/appliance//publish"), None);
        assert_eq!(device_uuid_from_push(""), None);
    }
}
