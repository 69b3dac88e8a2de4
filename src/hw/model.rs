use serde::Serialize;
use uuid::Uuid;

/// A discovered BLE peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
    advertised_services: Vec<Uuid>,
}

impl FoundDevice {
    /// Creates a new discovered-device record.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
            advertised_services: Vec::new(),
        }
    }

    pub(crate) fn with_advertised_services(mut self, services: Vec<Uuid>) -> Self {
        self.advertised_services = services;
        self
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns the service UUIDs seen in the advertisement.
    #[must_use]
    pub fn advertised_services(&self) -> &[Uuid] {
        &self.advertised_services
    }

    /// Returns whether the advertisement lists `service`.
    #[must_use]
    pub fn advertises(&self, service: Uuid) -> bool {
        self.advertised_services.contains(&service)
    }
}

/// A characteristic discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CharacteristicInfo {
    uuid: Uuid,
    properties: Vec<String>,
}

impl CharacteristicInfo {
    pub(crate) fn new(uuid: Uuid, properties: Vec<String>) -> Self {
        Self { uuid, properties }
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns property labels for this characteristic.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

/// A GATT service with its discovered characteristics.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ServiceInfo {
    uuid: Uuid,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub(crate) fn new(uuid: Uuid, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    /// Returns the service UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns all characteristics in this service.
    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }

    /// Returns whether this service exposes `characteristic`.
    #[must_use]
    pub fn has_characteristic(&self, characteristic: Uuid) -> bool {
        self.characteristics
            .iter()
            .any(|candidate| candidate.uuid == characteristic)
    }
}
