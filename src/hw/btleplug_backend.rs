use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use super::hardware::{DeviceLink, HardwareClient};
use super::model::{CharacteristicInfo, FoundDevice, ServiceInfo};
use crate::error::InteractionError;

/// Hardware client backed by `btleplug`.
///
/// The platform manager is created lazily on first use so that building the
/// client never touches the radio.
#[derive(Debug)]
pub(crate) struct BtleplugClient {
    stack: OnceCell<BleStack>,
}

#[derive(Debug)]
struct BleStack {
    _manager: Manager,
    adapters: Vec<AdapterHandle>,
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

impl BtleplugClient {
    pub(crate) fn new() -> Self {
        Self {
            stack: OnceCell::new(),
        }
    }

    async fn adapters(&self) -> Result<&[AdapterHandle], InteractionError> {
        let stack = self.stack.get_or_try_init(load_stack).await?;
        Ok(&stack.adapters)
    }

    async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral, InteractionError> {
        for handle in self.adapters().await? {
            for peripheral in handle.adapter.peripherals().await? {
                if peripheral.id().to_string() == device_id {
                    return Ok(peripheral);
                }
            }
        }

        Err(InteractionError::DeviceGone {
            device_id: device_id.to_string(),
        })
    }
}

#[instrument(level = "trace")]
async fn load_stack() -> Result<BleStack, InteractionError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(InteractionError::NoAdapters);
    }

    let mut handles = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let name = adapter.adapter_info().await?;
        handles.push(AdapterHandle { adapter, name });
    }
    info!(adapter_count = handles.len(), "BLE stack ready");

    Ok(BleStack {
        _manager: manager,
        adapters: handles,
    })
}

#[async_trait]
impl HardwareClient for BtleplugClient {
    #[instrument(skip(self), level = "debug")]
    async fn start_scan(&self, service_filter: Option<Uuid>) -> Result<(), InteractionError> {
        let filter = ScanFilter {
            services: service_filter.into_iter().collect(),
        };
        for handle in self.adapters().await? {
            debug!(adapter = %handle.name, "starting BLE scan");
            handle.adapter.start_scan(filter.clone()).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn discovered_devices(&self) -> Result<Vec<FoundDevice>, InteractionError> {
        let mut devices = Vec::new();
        for handle in self.adapters().await? {
            for peripheral in handle.adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    trace!(peripheral = %peripheral.id(), "peripheral has no properties yet");
                    continue;
                };

                devices.push(
                    FoundDevice::new(
                        handle.name.clone(),
                        peripheral.id().to_string(),
                        properties.local_name,
                        properties.rssi,
                    )
                    .with_advertised_services(properties.services),
                );
            }
        }
        Ok(devices)
    }

    #[instrument(skip(self), level = "debug")]
    async fn stop_scan(&self) -> Result<(), InteractionError> {
        for handle in self.adapters().await? {
            if let Err(error) = handle.adapter.stop_scan().await {
                debug!(?error, adapter = %handle.name, "failed to stop adapter scan cleanly");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, device), level = "debug", fields(device_id = device.device_id()))]
    async fn open_link(
        &self,
        device: &FoundDevice,
    ) -> Result<Box<dyn DeviceLink>, InteractionError> {
        let peripheral = self.find_peripheral(device.device_id()).await?;
        Ok(Box::new(BtleplugLink { peripheral }))
    }
}

/// Link bound to a real peripheral.
#[derive(Debug)]
struct BtleplugLink {
    peripheral: Peripheral,
}

impl BtleplugLink {
    fn characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, InteractionError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|candidate| candidate.service_uuid == service && candidate.uuid == characteristic)
            .ok_or(InteractionError::MissingCharacteristic {
                service,
                characteristic,
            })
    }
}

#[async_trait]
impl DeviceLink for BtleplugLink {
    #[instrument(skip(self), level = "debug")]
    async fn connect(&self) -> Result<(), InteractionError> {
        if !self.peripheral.is_connected().await? {
            self.peripheral.connect().await?;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn is_connected(&self) -> Result<bool, InteractionError> {
        Ok(self.peripheral.is_connected().await?)
    }

    #[instrument(skip(self), level = "debug")]
    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, InteractionError> {
        self.peripheral.discover_services().await?;
        Ok(collect_services(&self.peripheral))
    }

    #[instrument(skip(self, payload), level = "trace", fields(%characteristic, payload_len = payload.len()))]
    async fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic(service, characteristic)?;
        self.peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn disconnect(&self) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

fn collect_services(peripheral: &Peripheral) -> Vec<ServiceInfo> {
    let mut services: Vec<ServiceInfo> = peripheral
        .services()
        .into_iter()
        .map(|service| {
            let mut characteristics: Vec<CharacteristicInfo> = service
                .characteristics
                .iter()
                .map(|characteristic| {
                    CharacteristicInfo::new(
                        characteristic.uuid,
                        property_labels(characteristic.properties),
                    )
                })
                .collect();
            characteristics.sort_by_key(CharacteristicInfo::uuid);
            ServiceInfo::new(service.uuid, characteristics)
        })
        .collect();
    services.sort_by_key(ServiceInfo::uuid);
    services
}

fn property_labels(flags: CharPropFlags) -> Vec<String> {
    let labels: Vec<String> = flags
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    if labels.is_empty() {
        vec!["none".to_string()]
    } else {
        labels
    }
}
