//! Discovery port: the cloud API listing what the account owns.

use std::future::Future;

use fleetlink_domain::discovery::{HttpDeviceInfo, HttpSubdeviceInfo};
use fleetlink_domain::error::FleetError;
use fleetlink_domain::id::DeviceUuid;

/// Lists the devices bound to the account.
pub trait DiscoveryApi: Send + Sync + 'static {
    /// Every device bound to the account.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<HttpDeviceInfo>, FleetError>> + Send;

    /// Subordinates paired with `hub`.
    fn list_subdevices(
        &self,
        hub: &DeviceUuid,
    ) -> impl Future<Output = Result<Vec<HttpSubdeviceInfo>, FleetError>> + Send;
}
