//! Manager: the protocol engine.
//!
//! Owns the correlation table, the router and the device registry, and runs
//! the single dispatch task that consumes [`TransportEvent`]s in order.
//!
//! Lifecycle:
//!
//! 1. [`Manager::new`] with a transport, a discovery API and the receiving
//!    end of the transport's event channel.
//! 2. [`Manager::init`] spawns the dispatch task and waits for the
//!    subscription handshake.
//! 3. [`Manager::discover`] enrolls the fleet; commands and refreshes follow.
//! 4. [`Manager::close`] stops dispatching and disconnects.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use fleetlink_domain::capability::{Command, hub_digest_entries};
use fleetlink_domain::device::{DeviceHandle, RefreshRequest};
use fleetlink_domain::discovery::HttpDeviceInfo;
use fleetlink_domain::error::{FleetError, ValidationError};
use fleetlink_domain::factory::{build_device, build_subdevice};
use fleetlink_domain::id::{DeviceUuid, InternalId};
use fleetlink_domain::message::{Envelope, Method};
use fleetlink_domain::namespace::Namespace;
use fleetlink_domain::topic::{client_response_topic, device_request_topic, user_topic};

use crate::correlation::CorrelationTable;
use crate::ports::{DiscoveryApi, Transport, TransportEvent};
use crate::registry::{DeviceFilter, DeviceRegistry, lock_device};
use crate::router::NotificationRouter;

/// Default deadline for an acknowledgement.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for the connect/subscribe handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Session identity and timing of a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub user_id: String,
    pub key: String,
    /// Per-instance application id; part of the response topic.
    pub app_id: String,
    pub command_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl ManagerConfig {
    #[must_use]
    pub fn new(user_id: impl Into<String>, key: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            key: key.into(),
            app_id: app_id.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn response_topic(&self) -> String {
        client_response_topic(&self.user_id, &self.app_id)
    }

    #[must_use]
    pub fn user_topic(&self) -> String {
        user_topic(&self.user_id)
    }
}

/// What a discovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Newly enrolled devices, subordinates included.
    pub enrolled: Vec<InternalId>,
    /// Already enrolled devices refreshed from their HTTP record.
    pub refreshed: Vec<InternalId>,
    /// Enrolled base devices the cloud no longer lists.
    pub unreported: Vec<InternalId>,
    /// Listed devices that could not be enrolled.
    pub skipped: Vec<DeviceUuid>,
}

struct Inner<T, D> {
    config: ManagerConfig,
    transport: T,
    discovery: D,
    correlation: CorrelationTable,
    registry: DeviceRegistry,
    router: NotificationRouter,
    ready: watch::Sender<bool>,
    events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Cheaply cloneable handle on the engine.
pub struct Manager<T, D> {
    inner: Arc<Inner<T, D>>,
}

impl<T, D> Clone for Manager<T, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport, D: DiscoveryApi> Manager<T, D> {
    /// Create an engine. Nothing runs until [`init`](Self::init).
    pub fn new(config: ManagerConfig, transport: T, discovery: D, events: mpsc::Receiver<TransportEvent>) -> Self {
        let router = NotificationRouter::new(config.key.clone(), config.response_topic(), config.user_topic());
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                discovery,
                correlation: CorrelationTable::new(),
                registry: DeviceRegistry::new(),
                router,
                ready,
                events: Mutex::new(Some(events)),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn correlation(&self) -> &CorrelationTable {
        &self.inner.correlation
    }

    /// Whether the subscription handshake completed and the link is up.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Devices matching `filter`.
    #[must_use]
    pub fn find_devices(&self, filter: &DeviceFilter) -> Vec<DeviceHandle> {
        self.inner.registry.find(filter)
    }

    /// Spawn the dispatch task and wait until the broker acknowledged the
    /// subscriptions.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::AlreadyInitialized`] on a second call.
    /// - [`FleetError::TransportUnavailable`] when the handshake does not
    ///   complete within the configured timeout.
    #[tracing::instrument(skip(self), fields(user_id = %self.inner.config.user_id))]
    pub async fn init(&self) -> Result<(), FleetError> {
        let events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ValidationError::AlreadyInitialized)?;

        let mut ready = self.inner.ready.subscribe();
        let task = tokio::spawn(dispatch(Arc::clone(&self.inner), events));
        *self.inner.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        let handshake = self.inner.config.handshake_timeout;
        let outcome = match tokio::time::timeout(handshake, ready.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => {
                tracing::info!("manager ready");
                Ok(())
            }
            Ok(Err(_)) | Err(_) => {
                tracing::error!(?handshake, "broker handshake did not complete");
                Err(FleetError::TransportUnavailable)
            }
        };
        outcome
    }

    /// Sign, publish and await one request addressed to `uuid`.
    ///
    /// # Errors
    ///
    /// - [`FleetError::TransportUnavailable`] when the engine is not ready.
    /// - [`FleetError::CommandTimeout`] when no acknowledgement arrives.
    /// - [`FleetError::Protocol`] when the device answers `ERROR`.
    /// - [`FleetError::Transport`] when publishing fails.
    #[tracing::instrument(skip(self, payload, timeout), fields(uuid = %uuid, namespace = %namespace))]
    pub async fn execute_cmd(
        &self,
        uuid: &DeviceUuid,
        method: Method,
        namespace: Namespace,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, FleetError> {
        let ready = self.is_ready();
        if !ready {
            return Err(FleetError::TransportUnavailable);
        }

        let config = &self.inner.config;
        let envelope = Envelope::request(method, namespace, payload, &config.response_topic(), &config.key);
        let bytes = envelope
            .encode()
            .map_err(|error| FleetError::Transport(Box::new(error)))?;
        let call = self.inner.correlation.register(envelope.header.message_id)?;

        if let Err(error) = self.inner.transport.publish(&device_request_topic(uuid), bytes).await {
            self.inner.correlation.cancel(call.message_id());
            return Err(error);
        }
        tracing::debug!(message_id = %call.message_id(), %method, "request published");

        self.inner
            .correlation
            .await_response(call, timeout.unwrap_or(config.command_timeout))
            .await
    }

    /// Execute a device-composed command and apply its effect to `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`execute_cmd`](Self::execute_cmd).
    pub async fn apply(&self, handle: &DeviceHandle, command: &Command) -> Result<Value, FleetError> {
        let response = self
            .execute_cmd(
                &command.target,
                command.method,
                command.namespace.clone(),
                command.payload.clone(),
                None,
            )
            .await?;
        lock_device(handle).acknowledge(command, &response);
        Ok(response)
    }

    /// Poll the full state of a device.
    ///
    /// Subordinates are polled through their hub. After a hub refresh the
    /// reachability digest updates every registered subordinate.
    ///
    /// # Errors
    ///
    /// Same as [`execute_cmd`](Self::execute_cmd).
    pub async fn refresh(&self, handle: &DeviceHandle) -> Result<(), FleetError> {
        let (request, internal_id, uuid, is_hub) = {
            let device = lock_device(handle);
            (device.refresh_request(), device.internal_id(), device.uuid().clone(), device.is_hub())
        };
        match request {
            RefreshRequest::Direct(command) => {
                let response = self.apply(handle, &command).await?;
                if is_hub {
                    self.apply_hub_digest(&uuid, &response);
                }
            }
            RefreshRequest::ViaHub(command) => {
                self.apply(handle, &command).await?;
            }
            RefreshRequest::MissingNamespace => {
                tracing::error!(internal_id = %internal_id, "subdevice has no refresh namespace");
            }
            RefreshRequest::Unsupported => {
                tracing::debug!(internal_id = %internal_id, "device has nothing to refresh");
            }
        }
        Ok(())
    }

    fn apply_hub_digest(&self, hub: &DeviceUuid, response: &Value) {
        for (subdevice, entry) in hub_digest_entries(response) {
            let id = InternalId::subdevice(hub, &subdevice);
            if let Some(sub) = self.inner.registry.lookup_by_id(&id) {
                lock_device(&sub).handle_push(&Namespace::HubOnline, &entry);
            }
        }
    }

    /// Reconcile the registry with the cloud listing.
    ///
    /// Known devices are refreshed from their HTTP record, new ones are
    /// enrolled concurrently after an ability query, and each new hub gets
    /// its subordinates enrolled. With `update_subdevice_status`, new hubs
    /// are refreshed once every subordinate is enrolled.
    ///
    /// # Errors
    ///
    /// Returns the discovery API error when the device listing fails.
    /// Per-device failures are logged and reported as skipped.
    #[tracing::instrument(skip(self))]
    pub async fn discover(&self, update_subdevice_status: bool) -> Result<DiscoveryReport, FleetError> {
        let listed = self.inner.discovery.list_devices().await?;
        let mut report = DiscoveryReport::default();

        let listed_uuids: HashSet<&DeviceUuid> = listed.iter().map(|info| &info.uuid).collect();
        for handle in self.inner.registry.snapshot() {
            let device = lock_device(&handle);
            if device.subdevice_link().is_none() && !listed_uuids.contains(device.uuid()) {
                tracing::warn!(uuid = %device.uuid(), "enrolled device no longer reported by the cloud");
                report.unreported.push(device.internal_id());
            }
        }

        let mut fresh = Vec::new();
        for info in listed {
            let id = InternalId::base(&info.uuid);
            match self.inner.registry.lookup_by_id(&id) {
                Some(handle) => {
                    lock_device(&handle).update_from_http(&info);
                    report.refreshed.push(id);
                }
                None => fresh.push(info),
            }
        }

        let mut enrollments = JoinSet::new();
        for info in fresh {
            let manager = self.clone();
            enrollments.spawn(async move {
                let uuid = info.uuid.clone();
                (uuid, manager.enroll_device(info).await)
            });
        }
        let mut hubs = Vec::new();
        while let Some(joined) = enrollments.join_next().await {
            match joined {
                Ok((_, Ok(Some(handle)))) => {
                    let (id, is_hub) = {
                        let device = lock_device(&handle);
                        (device.internal_id(), device.is_hub())
                    };
                    if is_hub {
                        hubs.push(handle);
                    }
                    report.enrolled.push(id);
                }
                Ok((_, Ok(None))) => {}
                Ok((uuid, Err(error))) => {
                    tracing::error!(uuid = %uuid, %error, "could not enroll device");
                    report.skipped.push(uuid);
                }
                Err(error) => tracing::error!(%error, "enrollment task failed"),
            }
        }

        let mut subdevice_tasks = JoinSet::new();
        for hub in &hubs {
            let manager = self.clone();
            let hub = DeviceHandle::clone(hub);
            subdevice_tasks.spawn(async move { manager.enroll_subdevices(&hub).await });
        }
        // Collected once; the results are not awaited again.
        while let Some(joined) = subdevice_tasks.join_next().await {
            match joined {
                Ok(Ok(enrolled)) => report.enrolled.extend(enrolled),
                Ok(Err(error)) => tracing::error!(%error, "could not enroll subdevices"),
                Err(error) => tracing::error!(%error, "subdevice enrollment task failed"),
            }
        }

        if update_subdevice_status {
            for hub in &hubs {
                if let Err(error) = self.refresh(hub).await {
                    tracing::warn!(%error, "hub refresh failed");
                }
            }
        }

        tracing::info!(
            enrolled = report.enrolled.len(),
            refreshed = report.refreshed.len(),
            unreported = report.unreported.len(),
            skipped = report.skipped.len(),
            "discovery complete"
        );
        Ok(report)
    }

    async fn enroll_device(&self, info: HttpDeviceInfo) -> Result<Option<DeviceHandle>, FleetError> {
        let response = self
            .execute_cmd(&info.uuid, Method::Get, Namespace::SystemAbility, json!({}), None)
            .await?;
        let abilities = response
            .get("ability")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let device = build_device(&info, abilities)?;
        Ok(self.inner.registry.enroll(device))
    }

    async fn enroll_subdevices(&self, hub: &DeviceHandle) -> Result<Vec<InternalId>, FleetError> {
        let uuid = lock_device(hub).uuid().clone();
        let listed = self.inner.discovery.list_subdevices(&uuid).await?;

        let mut enrolled = Vec::new();
        for info in listed {
            let device = {
                let hub = lock_device(hub);
                build_subdevice(&info, &hub)?
            };
            let id = device.internal_id();
            if self.inner.registry.enroll(device).is_some() {
                lock_device(hub).register_subdevice(info.sub_device_id);
                enrolled.push(id);
            }
        }
        Ok(enrolled)
    }

    /// Stop dispatching, fail pending calls, drop every device and
    /// disconnect.
    ///
    /// # Errors
    ///
    /// Returns the transport error if disconnecting fails.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<(), FleetError> {
        self.inner.ready.send_replace(false);
        let task = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.inner.correlation.clear();
        let released = self.inner.registry.clear();
        tracing::info!(devices = released.len(), "released devices");
        self.inner.transport.disconnect().await
    }
}

async fn dispatch<T: Transport, D: DiscoveryApi>(inner: Arc<Inner<T, D>>, mut events: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected => {
                tracing::info!("connected to broker, subscribing");
                let topics = vec![inner.router.response_topic().to_string(), inner.router.user_topic().to_string()];
                if let Err(error) = inner.transport.subscribe(topics).await {
                    tracing::error!(%error, "subscription failed");
                }
            }
            TransportEvent::Subscribed => {
                tracing::info!("subscriptions acknowledged");
                inner.ready.send_replace(true);
            }
            TransportEvent::Disconnected { reason } => {
                tracing::warn!(%reason, "disconnected from broker");
                inner.ready.send_replace(false);
            }
            TransportEvent::Message { topic, payload } => {
                let outcome = inner.router.route(&topic, &payload, &inner.correlation, &inner.registry);
                tracing::trace!(?outcome, "routed frame");
            }
        }
    }
    inner.ready.send_replace(false);
    tracing::debug!("transport event stream closed");
}
