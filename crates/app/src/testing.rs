//! In-memory doubles for the ports, shared by the engine tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::mpsc;

use fleetlink_domain::discovery::{HttpDeviceInfo, HttpSubdeviceInfo};
use fleetlink_domain::error::FleetError;
use fleetlink_domain::id::DeviceUuid;
use fleetlink_domain::message::{Envelope, Method};
use fleetlink_domain::namespace::Namespace;

use crate::manager::{Manager, ManagerConfig};
use crate::ports::{DiscoveryApi, Transport, TransportEvent};

pub(crate) const KEY: &str = "key";

type Reply = Option<(Method, Namespace, Value)>;
type Responder = dyn Fn(&str, &Envelope) -> Reply + Send + Sync;

/// Acknowledge `envelope` with `payload`.
pub(crate) fn ack(envelope: &Envelope, payload: Value) -> Reply {
    let method = if envelope.header.method == Method::Get {
        Method::GetAck
    } else {
        Method::SetAck
    };
    Some((method, envelope.header.namespace.clone(), payload))
}

pub(crate) fn plug_info(uuid: &str) -> HttpDeviceInfo {
    let mut info = HttpDeviceInfo::new(uuid, "mss310");
    info.channels = vec![json!({})];
    info
}

/// Broker double: records what is published and answers through the
/// event channel, the way a device would.
pub(crate) struct ScriptedTransport {
    events: mpsc::Sender<TransportEvent>,
    responder: Box<Responder>,
    published: Mutex<Vec<(String, Envelope)>>,
    subscriptions: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl ScriptedTransport {
    pub(crate) fn new(
        responder: impl Fn(&str, &Envelope) -> Reply + Send + Sync + 'static,
    ) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (events, receiver) = mpsc::channel(64);
        let transport = Arc::new(Self {
            events,
            responder: Box::new(responder),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        });
        (transport, receiver)
    }

    pub(crate) fn emit(&self, event: TransportEvent) {
        if matches!(event, TransportEvent::Connected) {
            self.connected.store(true, Ordering::SeqCst);
        }
        self.events.try_send(event).unwrap();
    }

    pub(crate) fn published(&self) -> Vec<(String, Envelope)> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), FleetError>> + Send {
        let request = Envelope::decode(&payload, KEY).unwrap();
        let reply = (self.responder)(topic, &request).map(|(method, namespace, body)| {
            let frame = Envelope::signed(
                method,
                namespace,
                body,
                "/appliance/device/publish",
                KEY,
                request.header.message_id.clone(),
                request.header.timestamp,
            );
            TransportEvent::Message {
                topic: request.header.from.clone(),
                payload: frame.encode().unwrap(),
            }
        });
        self.published.lock().unwrap().push((topic.to_string(), request));
        let events = self.events.clone();
        async move {
            if let Some(reply) = reply {
                events.send(reply).await.unwrap();
            }
            Ok(())
        }
    }

    fn subscribe(&self, topics: Vec<String>) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.subscriptions.lock().unwrap().extend(topics);
        self.emit(TransportEvent::Subscribed);
        async { Ok(()) }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.connected.store(false, Ordering::SeqCst);
        async { Ok(()) }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct StaticDiscovery {
    pub devices: Vec<HttpDeviceInfo>,
    pub subdevices: HashMap<DeviceUuid, Vec<HttpSubdeviceInfo>>,
}

impl DiscoveryApi for StaticDiscovery {
    async fn list_devices(&self) -> Result<Vec<HttpDeviceInfo>, FleetError> {
        Ok(self.devices.clone())
    }

    async fn list_subdevices(&self, hub: &DeviceUuid) -> Result<Vec<HttpSubdeviceInfo>, FleetError> {
        Ok(self.subdevices.get(hub).cloned().unwrap_or_default())
    }
}

/// A manager wired to the doubles, already told that the broker connected.
pub(crate) fn harness(
    discovery: StaticDiscovery,
    responder: impl Fn(&str, &Envelope) -> Reply + Send + Sync + 'static,
) -> (Manager<Arc<ScriptedTransport>, StaticDiscovery>, Arc<ScriptedTransport>) {
    let (transport, events) = ScriptedTransport::new(responder);
    let manager = Manager::new(
        ManagerConfig::new("42", KEY, "app"),
        Arc::clone(&transport),
        discovery,
        events,
    );
    transport.emit(TransportEvent::Connected);
    (manager, transport)
}
