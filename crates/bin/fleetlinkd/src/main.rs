//! # fleetlinkd: fleetlink daemon
//!
//! Composition root that wires the MQTT transport and the static inventory
//! into the engine.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Install the tracing subscriber
//! - Open the broker connection and build the [`Manager`]
//! - Run the handshake and discovery, then log the fleet
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no protocol logic belongs here.

mod config;
mod inventory;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use fleetlink_adapter_mqtt::{MqttCredentials, connect};
use fleetlink_app::manager::Manager;
use fleetlink_app::ports::{DiscoveryApi, Transport};
use fleetlink_app::registry::lock_device;

use crate::config::Config;
use crate::inventory::StaticInventory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let credentials = match &config.account.app_id {
        Some(app_id) => MqttCredentials::with_app_id(&config.account.user_id, &config.account.key, app_id),
        None => MqttCredentials::new(&config.account.user_id, &config.account.key),
    };
    let (transport, events) = connect(&config.mqtt, &credentials).context("configuring broker connection")?;

    let inventory = StaticInventory::from_config(&config.inventory);
    if inventory.is_empty() {
        tracing::warn!("inventory is empty, nothing will be enrolled");
    } else {
        tracing::info!(devices = inventory.len(), "inventory loaded");
    }
    let manager = Manager::new(config.manager_config(&credentials.app_id), transport, inventory, events);

    manager.init().await.context("broker handshake")?;
    let report = manager
        .discover(config.engine.update_subdevice_status)
        .await
        .context("device discovery")?;
    for uuid in &report.skipped {
        tracing::warn!(uuid = %uuid, "device skipped");
    }
    log_fleet(&manager);

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutting down");
    manager.close().await.context("closing manager")?;
    Ok(())
}

fn log_fleet<T: Transport, D: DiscoveryApi>(manager: &Manager<T, D>) {
    let registry = manager.registry();
    for handle in registry.snapshot() {
        let status = registry.online_status(&handle);
        let device = lock_device(&handle);
        let tags: Vec<_> = device.tags().iter().collect();
        tracing::info!(
            internal_id = %device.internal_id(),
            name = device.name(),
            device_type = device.device_type().unwrap_or("unknown"),
            ?status,
            ?tags,
            "device enrolled"
        );
    }
}
