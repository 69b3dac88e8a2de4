use std::fmt::{self, Display, Formatter};

use crate::hw::FoundDevice;
use crate::protocol;
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

/// Renders one `FoundDevice` as a key-value table.
pub(crate) struct DeviceView<'a> {
    device: &'a FoundDevice,
    painter: &'a Painter,
}

impl<'a> DeviceView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, painter: &'a Painter) -> Self {
        Self { device, painter }
    }
}

impl Display for DeviceView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = self.device.local_name().unwrap_or("<unknown>");
        let table = Table::key_value(
            self.painter,
            vec![
                ("adapter", self.painter.value(self.device.adapter_name())),
                ("device_id", self.painter.value(self.device.device_id())),
                ("name", self.painter.value(name)),
                ("rssi", self.painter.value(format_rssi(self.device.rssi()))),
                (
                    "car_service",
                    self.painter
                        .yes_no(self.device.advertises(protocol::car_service_uuid())),
                ),
            ],
        );
        write!(f, "{table}")
    }
}

/// Renders the devices found by a scan, one row each.
pub(crate) struct ScanView<'a> {
    devices: &'a [FoundDevice],
    painter: &'a Painter,
}

impl<'a> ScanView<'a> {
    pub(crate) fn new(devices: &'a [FoundDevice], painter: &'a Painter) -> Self {
        Self { devices, painter }
    }
}

impl Display for ScanView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.devices.is_empty() {
            return write!(f, "{}", self.painter.warning("No devices found."));
        }

        let rows = self
            .devices
            .iter()
            .map(|device| {
                vec![
                    self.painter.value(device.device_id()),
                    self.painter
                        .value(device.local_name().unwrap_or("<unknown>")),
                    self.painter.value(format_rssi(device.rssi())),
                    self.painter.muted(device.adapter_name()),
                    self.painter
                        .yes_no(device.advertises(protocol::car_service_uuid())),
                ]
            })
            .collect();
        let table = Table::grid(["device_id", "name", "rssi", "adapter", "car"], rows);

        write!(
            f,
            "{}",
            self.painter
                .heading(format!("Found {} device(s):", self.devices.len()))
        )?;
        write!(f, "\n{table}")
    }
}
