use std::collections::BTreeMap;

use serde::Serialize;

use crate::hw::{FoundDevice, ServiceInfo};
use crate::protocol;

/// What the driving screen can show for the current state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DriveReadiness {
    #[display("No device selected")]
    NoDevice,
    #[display("Unable to connect, try again...")]
    NotConnected,
    #[display("Connecting to service...")]
    AwaitingService,
    #[display("Ready to drive")]
    Ready,
}

/// Snapshot of everything the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiState {
    is_scanning: bool,
    found_devices: Vec<FoundDevice>,
    active_device: Option<FoundDevice>,
    is_device_connected: bool,
    discovered_characteristics: BTreeMap<String, Vec<String>>,
}

impl UiState {
    pub(crate) fn compose(
        is_scanning: bool,
        found_devices: Vec<FoundDevice>,
        active_device: Option<FoundDevice>,
        is_device_connected: bool,
        services: &[ServiceInfo],
    ) -> Self {
        let discovered_characteristics = services
            .iter()
            .map(|service| {
                let characteristics = service
                    .characteristics()
                    .iter()
                    .map(|characteristic| characteristic.uuid().to_string())
                    .collect();
                (service.uuid().to_string(), characteristics)
            })
            .collect();

        Self {
            is_scanning,
            found_devices,
            active_device,
            is_device_connected,
            discovered_characteristics,
        }
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.is_scanning
    }

    #[must_use]
    pub fn found_devices(&self) -> &[FoundDevice] {
        &self.found_devices
    }

    #[must_use]
    pub fn active_device(&self) -> Option<&FoundDevice> {
        self.active_device.as_ref()
    }

    #[must_use]
    pub fn is_device_connected(&self) -> bool {
        self.is_device_connected
    }

    /// Service UUID strings mapped to their characteristic UUID strings.
    #[must_use]
    pub fn discovered_characteristics(&self) -> &BTreeMap<String, Vec<String>> {
        &self.discovered_characteristics
    }

    /// Returns whether the car service has been discovered.
    #[must_use]
    pub fn has_car_service(&self) -> bool {
        self.discovered_characteristics
            .contains_key(&protocol::car_service_uuid().to_string())
    }

    #[must_use]
    pub fn readiness(&self) -> DriveReadiness {
        if self.active_device.is_none() {
            DriveReadiness::NoDevice
        } else if !self.is_device_connected {
            DriveReadiness::NotConnected
        } else if !self.has_car_service() {
            DriveReadiness::AwaitingService
        } else {
            DriveReadiness::Ready
        }
    }
}
