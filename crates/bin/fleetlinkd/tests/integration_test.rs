//! End-to-end tests for the engine against a simulated vendor cloud.
//!
//! The simulated cloud plays both the broker and the devices: it answers
//! every published request on the client's response topic and can inject
//! pushes on the user topic. No network connection is opened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::mpsc;

use fleetlink_app::manager::{Manager, ManagerConfig};
use fleetlink_app::ports::{DiscoveryApi, Transport, TransportEvent};
use fleetlink_app::registry::{DeviceFilter, lock_device};
use fleetlink_domain::capability::{CapabilityTag, TempHumSensor, ToggleX};
use fleetlink_domain::discovery::{HttpDeviceInfo, HttpSubdeviceInfo};
use fleetlink_domain::error::FleetError;
use fleetlink_domain::id::{DeviceUuid, InternalId, SubdeviceId};
use fleetlink_domain::message::{Envelope, Method};
use fleetlink_domain::namespace::Namespace;
use fleetlink_domain::online::OnlineStatus;

const USER: &str = "7";
const KEY: &str = "secret";
const USER_TOPIC: &str = "/app/7/subscribe";

struct SimulatedCloud {
    events: mpsc::Sender<TransportEvent>,
    connected: AtomicBool,
    requests: Mutex<Vec<(String, Envelope)>>,
}

impl SimulatedCloud {
    fn start() -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (events, receiver) = mpsc::channel(64);
        let cloud = Arc::new(Self {
            events,
            connected: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        });
        cloud.events.try_send(TransportEvent::Connected).unwrap();
        (cloud, receiver)
    }

    fn requests(&self) -> Vec<(String, Envelope)> {
        self.requests.lock().unwrap().clone()
    }

    async fn push(&self, uuid: &str, namespace: Namespace, payload: Value) {
        let frame = Envelope::request(Method::Push, namespace, payload, &format!("/appliance/{uuid}/publish"), KEY);
        self.events
            .send(TransportEvent::Message {
                topic: USER_TOPIC.to_string(),
                payload: frame.encode().unwrap(),
            })
            .await
            .unwrap();
        // Let the dispatch task drain the frame.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    fn answer(uuid: &str, request: &Envelope) -> (Method, Value) {
        if request.header.method == Method::Set {
            return (Method::SetAck, json!({}));
        }
        let payload = match (&request.header.namespace, uuid) {
            (Namespace::SystemAbility, "plug") => json!({"ability": {
                "Appliance.System.All": {},
                "Appliance.System.Online": {},
                "Appliance.Control.ToggleX": {},
                "Appliance.Control.Electricity": {}
            }}),
            (Namespace::SystemAbility, _) => json!({"ability": {
                "Appliance.System.All": {},
                "Appliance.System.Online": {},
                "Appliance.Hub.SubdeviceList": {},
                "Appliance.Hub.Sensor.All": {},
                "Appliance.Hub.Mts100.All": {}
            }}),
            (Namespace::SystemAll, _) => json!({"all": {
                "system": {"online": {"status": 1}, "firmware": {"version": "3.1.0"}},
                "digest": {"hub": {"subdevice": [
                    {"id": "SD1", "status": 1},
                    {"id": "V1", "status": 2}
                ]}}
            }}),
            (Namespace::HubSensorAll, _) => json!({"all": [
                {"id": "SD1", "temperature": {"latest": 195}, "humidity": {"latest": 455}, "online": {"status": 1}}
            ]}),
            (Namespace::ControlElectricity, _) => {
                json!({"electricity": {"channel": 0, "current": 500, "voltage": 2300, "power": 115_000}})
            }
            _ => json!({}),
        };
        (Method::GetAck, payload)
    }
}

impl Transport for SimulatedCloud {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), FleetError> {
        let request = Envelope::decode(&payload, KEY).unwrap();
        let uuid = topic.split('/').nth(2).unwrap_or_default().to_string();
        let (method, body) = Self::answer(&uuid, &request);
        let reply = Envelope::signed(
            method,
            request.header.namespace.clone(),
            body,
            &format!("/appliance/{uuid}/publish"),
            KEY,
            request.header.message_id.clone(),
            request.header.timestamp,
        );
        let response_topic = request.header.from.clone();
        self.requests.lock().unwrap().push((topic.to_string(), request));
        self.events
            .send(TransportEvent::Message {
                topic: response_topic,
                payload: reply.encode().unwrap(),
            })
            .await
            .unwrap();
        Ok(())
    }

    async fn subscribe(&self, _topics: Vec<String>) -> Result<(), FleetError> {
        self.events.send(TransportEvent::Subscribed).await.unwrap();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FleetError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct Account {
    devices: Vec<HttpDeviceInfo>,
    subdevices: HashMap<DeviceUuid, Vec<HttpSubdeviceInfo>>,
}

impl DiscoveryApi for Account {
    async fn list_devices(&self) -> Result<Vec<HttpDeviceInfo>, FleetError> {
        Ok(self.devices.clone())
    }

    async fn list_subdevices(&self, hub: &DeviceUuid) -> Result<Vec<HttpSubdeviceInfo>, FleetError> {
        Ok(self.subdevices.get(hub).cloned().unwrap_or_default())
    }
}

fn account() -> Account {
    let mut plug = HttpDeviceInfo::new("plug", "mss310");
    plug.channels = vec![json!({})];
    let mut subdevices = HashMap::new();
    subdevices.insert(
        DeviceUuid::new("hub"),
        vec![HttpSubdeviceInfo::new("SD1", "ms100"), HttpSubdeviceInfo::new("V1", "mts100v3")],
    );
    Account {
        devices: vec![plug, HttpDeviceInfo::new("hub", "msh300")],
        subdevices,
    }
}

async fn running() -> (Manager<Arc<SimulatedCloud>, Account>, Arc<SimulatedCloud>) {
    let (cloud, events) = SimulatedCloud::start();
    let manager = Manager::new(ManagerConfig::new(USER, KEY, "itest"), Arc::clone(&cloud), account(), events);
    manager.init().await.unwrap();
    (manager, cloud)
}

fn sub_id(id: &str) -> InternalId {
    InternalId::subdevice(&DeviceUuid::new("hub"), &SubdeviceId::new(id))
}

#[tokio::test]
async fn should_enroll_fleet_and_apply_hub_digest() {
    let (manager, _cloud) = running().await;

    let report = manager.discover(true).await.unwrap();
    assert_eq!(report.enrolled.len(), 4);
    assert!(report.skipped.is_empty());

    let registry = manager.registry();
    let hub = registry.lookup_by_id(&InternalId::base(&DeviceUuid::new("hub"))).unwrap();
    assert!(lock_device(&hub).is_hub());
    assert_eq!(lock_device(&hub).firmware_version(), Some("3.1.0"));

    let sensor = registry.lookup_by_id(&sub_id("SD1")).unwrap();
    let valve = registry.lookup_by_id(&sub_id("V1")).unwrap();
    assert_eq!(registry.online_status(&sensor), OnlineStatus::Online);
    assert_eq!(registry.online_status(&valve), OnlineStatus::Offline);

    let valves = manager.find_devices(&DeviceFilter::default().with_tag(CapabilityTag::Valve));
    assert_eq!(valves.len(), 1);
}

#[tokio::test]
async fn should_switch_plug_and_follow_pushes() {
    let (manager, cloud) = running().await;
    manager.discover(false).await.unwrap();
    let plug = manager
        .registry()
        .lookup_by_id(&InternalId::base(&DeviceUuid::new("plug")))
        .unwrap();

    manager.turn_on(&plug, 0).await.unwrap();
    assert_eq!(lock_device(&plug).unit::<ToggleX>().unwrap().is_on(0), Some(true));

    cloud
        .push("plug", Namespace::ControlToggleX, json!({"togglex": {"channel": 0, "onoff": 0}}))
        .await;
    assert_eq!(lock_device(&plug).unit::<ToggleX>().unwrap().is_on(0), Some(false));

    let sample = manager.read_electricity(&plug, 0).await.unwrap();
    assert!((sample.power_watts - 115.0).abs() < 1e-9);

    cloud.push("plug", Namespace::ControlUnbind, json!({})).await;
    assert!(manager.registry().lookup_by_id(&InternalId::base(&DeviceUuid::new("plug"))).is_none());
}

#[tokio::test]
async fn should_refresh_sensor_through_hub() {
    let (manager, cloud) = running().await;
    manager.discover(false).await.unwrap();
    let sensor = manager.registry().lookup_by_id(&sub_id("SD1")).unwrap();

    manager.refresh(&sensor).await.unwrap();

    let (topic, request) = cloud.requests().pop().unwrap();
    assert_eq!(topic, "/appliance/hub/subscribe");
    assert_eq!(request.payload, json!({"all": [{"id": "SD1"}]}));
    let device = lock_device(&sensor);
    let unit = device.unit::<TempHumSensor>().unwrap();
    assert_eq!(unit.temperature(), Some(19.5));
    assert_eq!(unit.humidity(), Some(45.5));
}

#[tokio::test]
async fn should_drop_everything_on_close() {
    let (manager, cloud) = running().await;
    manager.discover(false).await.unwrap();
    manager.close().await.unwrap();

    assert!(manager.registry().is_empty());
    assert!(!cloud.is_connected());
    let err = manager
        .execute_cmd(&DeviceUuid::new("plug"), Method::Get, Namespace::SystemAll, json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::TransportUnavailable));
}
