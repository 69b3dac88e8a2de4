use std::fmt::Debug;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::btleplug_backend::BtleplugClient;
use super::fake_backend::{FakeBackendConfig, FakeHardwareClient};
use super::model::{FoundDevice, ServiceInfo};
use crate::error::InteractionError;

/// Entry point to a BLE stack: discovery plus opening links to peers.
#[async_trait]
pub trait HardwareClient: Send + Sync + Debug {
    /// Starts discovery. `service_filter` is a hint; backends may ignore it.
    async fn start_scan(&self, service_filter: Option<Uuid>) -> Result<(), InteractionError>;

    /// Returns every peer seen since the scan started.
    async fn discovered_devices(&self) -> Result<Vec<FoundDevice>, InteractionError>;

    /// Stops discovery.
    async fn stop_scan(&self) -> Result<(), InteractionError>;

    /// Creates an unconnected link to `device`.
    async fn open_link(
        &self,
        device: &FoundDevice,
    ) -> Result<Box<dyn DeviceLink>, InteractionError>;
}

/// A link to one peripheral: the platform connection object.
#[async_trait]
pub trait DeviceLink: Send + Sync + Debug {
    async fn connect(&self) -> Result<(), InteractionError>;

    /// Reports whether the peer still holds the link. Peers may drop it on
    /// their own at any time.
    async fn is_connected(&self) -> Result<bool, InteractionError>;

    /// Discovers services and returns them sorted by UUID.
    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, InteractionError>;

    /// Writes `payload` and waits for the peer to acknowledge it.
    async fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError>;

    /// Tears the link down. Disconnecting an idle link is not an error.
    async fn disconnect(&self) -> Result<(), InteractionError>;
}

/// Builds a hardware client for the platform BLE stack.
pub(crate) fn real_hardware_client() -> Box<dyn HardwareClient> {
    Box::new(BtleplugClient::new())
}

/// Builds a hardware client backed by fixtures.
pub(crate) fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    info!("using fake BLE backend");
    Box::new(FakeHardwareClient::new(config))
}
