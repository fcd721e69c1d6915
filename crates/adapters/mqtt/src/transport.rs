//! rumqttc-backed [`Transport`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter, TlsConfiguration,
};
use tokio::sync::{mpsc, watch};

use fleetlink_app::ports::{Transport, TransportEvent};
use fleetlink_domain::error::FleetError;

use crate::config::MqttConfig;
use crate::credentials::MqttCredentials;
use crate::error::MqttError;

/// Connection to the vendor broker.
///
/// Created by [`connect`]; the paired receiver yields the
/// [`TransportEvent`]s the engine consumes.
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

/// Open the broker connection and start the event loop task.
///
/// The connection itself is established by the event loop; the first
/// [`TransportEvent::Connected`] signals it is up.
///
/// # Errors
///
/// Returns [`MqttError::Tls`] when the configured CA file cannot be read.
pub fn connect(
    config: &MqttConfig,
    credentials: &MqttCredentials,
) -> Result<(MqttTransport, mpsc::Receiver<TransportEvent>), MqttError> {
    let options = build_options(config, credentials)?;
    let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);
    let (events, receiver) = mpsc::channel(config.channel_capacity);
    let connected = Arc::new(AtomicBool::new(false));
    let (shutdown, shutdown_rx) = watch::channel(false);

    tracing::info!(
        host = %config.broker_host,
        port = config.broker_port,
        tls = config.tls,
        "connecting to broker"
    );
    tokio::spawn(run_event_loop(
        eventloop,
        events,
        Arc::clone(&connected),
        shutdown_rx,
        config.auto_reconnect.then(|| config.reconnect_delay()),
    ));

    Ok((
        MqttTransport {
            client,
            connected,
            shutdown,
        },
        receiver,
    ))
}

fn build_options(config: &MqttConfig, credentials: &MqttCredentials) -> Result<MqttOptions, MqttError> {
    let mut options = MqttOptions::new(credentials.client_id(), config.broker_host.clone(), config.broker_port);
    options.set_keep_alive(config.keep_alive());
    options.set_credentials(credentials.user_id.clone(), credentials.password());
    options.set_clean_session(true);
    if config.tls {
        options.set_transport(tls_transport(config)?);
    }
    Ok(options)
}

fn tls_transport(config: &MqttConfig) -> Result<rumqttc::Transport, MqttError> {
    let Some(path) = &config.ca_file else {
        return Ok(rumqttc::Transport::tls_with_default_config());
    };
    let ca = std::fs::read(path).map_err(|source| MqttError::Tls {
        path: path.clone(),
        source,
    })?;
    Ok(rumqttc::Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: None,
    }))
}

/// Translate one rumqttc event into what the engine cares about.
fn classify(event: Event) -> Option<TransportEvent> {
    let Event::Incoming(packet) = event else {
        return None;
    };
    match packet {
        Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => Some(TransportEvent::Connected),
        Packet::ConnAck(ack) => Some(TransportEvent::Disconnected {
            reason: format!("connection refused: {:?}", ack.code),
        }),
        Packet::SubAck(_) => Some(TransportEvent::Subscribed),
        Packet::Publish(publish) => Some(TransportEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }),
        Packet::Disconnect => Some(TransportEvent::Disconnected {
            reason: "broker closed the session".to_string(),
        }),
        _ => None,
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    events: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    reconnect_delay: Option<Duration>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            event = eventloop.poll() => event,
        };
        let event = match event {
            Ok(event) => match classify(event) {
                Some(event) => event,
                None => continue,
            },
            Err(error) => {
                connected.store(false, Ordering::SeqCst);
                tracing::warn!(%error, "broker connection lost");
                let reason = error.to_string();
                if events.send(TransportEvent::Disconnected { reason }).await.is_err() {
                    break;
                }
                match reconnect_delay {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => break,
                }
            }
        };

        match &event {
            TransportEvent::Connected => connected.store(true, Ordering::SeqCst),
            TransportEvent::Disconnected { .. } => connected.store(false, Ordering::SeqCst),
            _ => {}
        }
        if events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped, stopping event loop");
            break;
        }
    }
    connected.store(false, Ordering::SeqCst);
    tracing::debug!("event loop stopped");
}

impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), FleetError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected.into());
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(MqttError::Client)?;
        tracing::trace!(topic, "published");
        Ok(())
    }

    async fn subscribe(&self, topics: Vec<String>) -> Result<(), FleetError> {
        let filters: Vec<SubscribeFilter> = topics
            .into_iter()
            .map(|topic| SubscribeFilter::new(topic, QoS::AtMostOnce))
            .collect();
        self.client.subscribe_many(filters).await.map_err(MqttError::Client)?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), FleetError> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected && let Err(error) = self.client.disconnect().await {
            tracing::debug!(%error, "disconnect request not delivered");
        }
        self.shutdown.send_replace(true);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish, SubAck, SubscribeReasonCode};

    fn plain(host: &str, port: u16) -> MqttConfig {
        MqttConfig {
            broker_host: host.to_string(),
            broker_port: port,
            tls: false,
            auto_reconnect: false,
            ..MqttConfig::default()
        }
    }

    #[test]
    fn should_use_app_client_id() {
        let credentials = MqttCredentials::with_app_id("42", "key", "abc");
        let options = build_options(&plain("broker.local", 1883), &credentials).unwrap();
        assert_eq!(options.client_id(), "app:abc");
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1883));
    }

    #[test]
    fn should_fail_on_unreadable_ca_file() {
        let config = MqttConfig {
            ca_file: Some("/nonexistent/fleetlink-ca.pem".into()),
            ..MqttConfig::default()
        };
        let err = build_options(&config, &MqttCredentials::new("42", "key")).unwrap_err();
        assert!(matches!(err, MqttError::Tls { .. }));
    }

    #[test]
    fn should_classify_broker_packets() {
        let ack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        }));
        assert_eq!(classify(ack), Some(TransportEvent::Connected));

        let refused = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
        }));
        assert!(matches!(classify(refused), Some(TransportEvent::Disconnected { .. })));

        let suback = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 1,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        }));
        assert_eq!(classify(suback), Some(TransportEvent::Subscribed));

        let publish = Event::Incoming(Packet::Publish(Publish::new(
            "/app/42/subscribe",
            QoS::AtMostOnce,
            b"{}".to_vec(),
        )));
        assert_eq!(
            classify(publish),
            Some(TransportEvent::Message {
                topic: "/app/42/subscribe".to_string(),
                payload: b"{}".to_vec(),
            })
        );

        assert_eq!(classify(Event::Incoming(Packet::PingResp)), None);
    }

    #[tokio::test]
    async fn should_refuse_publish_while_disconnected() {
        let (transport, _events) = connect(&plain("127.0.0.1", 1), &MqttCredentials::new("42", "key")).unwrap();
        assert!(!transport.is_connected());
        let err = transport.publish("/appliance/x/subscribe", b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, FleetError::TransportUnavailable));
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn should_report_unreachable_broker() {
        let (_transport, mut events) = connect(&plain("127.0.0.1", 1), &MqttCredentials::new("42", "key")).unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TransportEvent::Disconnected { .. }));
        // Without auto-reconnect the loop stops and closes the stream.
        assert!(events.recv().await.is_none());
    }
}
