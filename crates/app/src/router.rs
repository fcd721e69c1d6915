//! Notification router: classifies inbound frames.
//!
//! Acknowledgements on the response topic resolve pending calls; pushes on
//! the user topic reach the push contract of the originating device (and,
//! for hubs, of the subordinates listed in hub-family payloads). Everything
//! else is logged and dropped.

use fleetlink_domain::capability::subdevice_entries;
use fleetlink_domain::error::ProtocolError;
use fleetlink_domain::id::{DeviceUuid, InternalId, MessageId};
use fleetlink_domain::message::{Envelope, Method};
use fleetlink_domain::namespace::Namespace;
use fleetlink_domain::topic::device_uuid_from_push;

use crate::correlation::CorrelationTable;
use crate::registry::{DeviceRegistry, lock_device};

/// Decision taken for one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// An acknowledgement; `resolved` is false for late or foreign ids.
    Acknowledged { message_id: MessageId, resolved: bool },
    /// A push delivered to an enrolled device.
    Pushed { internal_id: InternalId, handled: bool },
    /// An unbind push removed the device.
    Relinquished { internal_id: InternalId },
    /// A push from a device that is not enrolled.
    Unmatched { uuid: DeviceUuid },
    /// Wrong topic/method combination or unreadable origin.
    Unroutable,
    /// Malformed frame or bad signature.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct NotificationRouter {
    key: String,
    response_topic: String,
    user_topic: String,
}

impl NotificationRouter {
    #[must_use]
    pub fn new(key: impl Into<String>, response_topic: impl Into<String>, user_topic: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            response_topic: response_topic.into(),
            user_topic: user_topic.into(),
        }
    }

    #[must_use]
    pub fn response_topic(&self) -> &str {
        &self.response_topic
    }

    #[must_use]
    pub fn user_topic(&self) -> &str {
        &self.user_topic
    }

    /// Route one inbound frame.
    pub fn route(
        &self,
        topic: &str,
        bytes: &[u8],
        correlation: &CorrelationTable,
        registry: &DeviceRegistry,
    ) -> RouteOutcome {
        let envelope = match Envelope::decode(bytes, &self.key) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(topic, %error, "dropping inbound frame");
                return RouteOutcome::Rejected;
            }
        };
        let method = envelope.header.method;

        if topic == self.response_topic && method.is_ack() {
            let resolution = if method == Method::Error {
                Err(ProtocolError {
                    payload: envelope.payload,
                })
            } else {
                Ok(envelope.payload)
            };
            let message_id = envelope.header.message_id;
            let resolved = correlation.resolve(&message_id, resolution);
            return RouteOutcome::Acknowledged { message_id, resolved };
        }

        if topic == self.user_topic && method == Method::Push {
            return Self::route_push(&envelope, registry);
        }

        tracing::debug!(
            topic,
            %method,
            namespace = %envelope.header.namespace,
            "discarding frame on unexpected topic"
        );
        RouteOutcome::Unroutable
    }

    fn route_push(envelope: &Envelope, registry: &DeviceRegistry) -> RouteOutcome {
        let Some(uuid) = device_uuid_from_push(&envelope.header.from) else {
            tracing::warn!(from = %envelope.header.from, "push with unreadable origin");
            return RouteOutcome::Unroutable;
        };
        let namespace = &envelope.header.namespace;

        if *namespace == Namespace::ControlUnbind {
            let internal_id = InternalId::base(&uuid);
            return match registry.relinquish(&internal_id) {
                Ok(_) => {
                    tracing::info!(uuid = %uuid, "device unbound from account");
                    RouteOutcome::Relinquished { internal_id }
                }
                Err(_) => RouteOutcome::Unmatched { uuid },
            };
        }

        let handle = match registry.lookup_base_by_uuid(&uuid) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                tracing::debug!(uuid = %uuid, namespace = %namespace, "push for unknown device");
                return RouteOutcome::Unmatched { uuid };
            }
            Err(error) => {
                tracing::error!(uuid = %uuid, %error, "cannot route push");
                return RouteOutcome::Unmatched { uuid };
            }
        };

        let (internal_id, mut handled, is_hub) = {
            let mut device = lock_device(&handle);
            let handled = device.handle_push(namespace, &envelope.payload);
            (device.internal_id(), handled, device.is_hub())
        };

        if is_hub && namespace.is_hub_family() {
            for (subdevice, entry) in subdevice_entries(&envelope.payload) {
                let sub_id = InternalId::subdevice(&uuid, &subdevice);
                match registry.lookup_by_id(&sub_id) {
                    Some(sub) => handled |= lock_device(&sub).handle_push(namespace, entry),
                    None => tracing::debug!(internal_id = %sub_id, "hub push for unknown subdevice"),
                }
            }
        }

        if !handled {
            tracing::debug!(internal_id = %internal_id, namespace = %namespace, "push not handled");
        }
        RouteOutcome::Pushed { internal_id, handled }
    }
}
