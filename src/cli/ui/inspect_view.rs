use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

use crate::protocol;
use crate::view::{DriveReadiness, UiState};

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders the selected device, its connection status and discovered services.
pub(crate) struct InspectView<'a> {
    state: &'a UiState,
    painter: &'a Painter,
}

impl<'a> InspectView<'a> {
    pub(crate) fn new(state: &'a UiState, painter: &'a Painter) -> Self {
        Self { state, painter }
    }

    fn status_table(&self) -> Table {
        let readiness = self.state.readiness();
        let readiness = if readiness == DriveReadiness::Ready {
            self.painter.success(readiness.to_string())
        } else {
            self.painter.warning(readiness.to_string())
        };
        Table::key_value(
            self.painter,
            vec![
                (
                    "connected",
                    self.painter.yes_no(self.state.is_device_connected()),
                ),
                ("car_service", self.painter.yes_no(self.state.has_car_service())),
                ("status", readiness),
            ],
        )
    }

    fn services_table(&self) -> Table {
        let mut rows = Vec::new();
        for (service, characteristics) in self.state.discovered_characteristics() {
            if characteristics.is_empty() {
                rows.push(vec![
                    self.painter.value(service),
                    self.painter.warning("<none>"),
                    self.endpoint_label(service),
                ]);
                continue;
            }
            for characteristic in characteristics {
                rows.push(vec![
                    self.painter.value(service),
                    self.painter.value(characteristic),
                    self.endpoint_label(characteristic),
                ]);
            }
        }
        Table::grid(["service_uuid", "characteristic_uuid", "endpoint"], rows)
    }

    fn endpoint_label(&self, uuid: &str) -> String {
        Uuid::parse_str(uuid)
            .ok()
            .and_then(|uuid| protocol::endpoint_for_uuid(&uuid))
            .map_or_else(
                || self.painter.muted("-"),
                |endpoint| self.painter.value(endpoint.to_string()),
            )
    }
}

impl Display for InspectView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Some(device) = self.state.active_device() else {
            return write!(f, "{}", self.painter.warning("No device selected."));
        };

        write!(f, "{}", self.painter.heading("Device:"))?;
        write!(f, "\n{}", DeviceView::new(device, self.painter))?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Connection:"))?;
        write!(f, "\n{}", self.status_table())?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("Discovered services:"))?;
        let services = self.services_table();
        if services.is_empty() {
            write!(f, "\n{}", self.painter.warning("<none>"))
        } else {
            write!(f, "\n{services}")
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::hw::{CharacteristicInfo, FoundDevice, ServiceInfo};
    use crate::protocol::EndpointId;

    fn car() -> FoundDevice {
        FoundDevice::new("hci0".into(), "AA:BB:CC".into(), Some("Lambcar".into()), Some(-43))
            .with_advertised_services(vec![protocol::car_service_uuid()])
    }

    #[test]
    fn connected_car_lists_endpoints() {
        let services = vec![ServiceInfo::new(
            protocol::car_service_uuid(),
            vec![CharacteristicInfo::new(
                protocol::endpoint_metadata(EndpointId::Turn).uuid(),
                vec!["write".into()],
            )],
        )];
        let state = UiState::compose(false, Vec::new(), Some(car()), true, &services);
        let painter = Painter::new(false);

        assert_snapshot!(InspectView::new(&state, &painter).to_string(), @r"
        Device:
        ╭─────────────┬──────────╮
        │ field       │ value    │
        ├─────────────┼──────────┤
        │ adapter     │ hci0     │
        │ device_id   │ AA:BB:CC │
        │ name        │ Lambcar  │
        │ rssi        │ -43      │
        │ car_service │ yes      │
        ╰─────────────┴──────────╯

        Connection:
        ╭─────────────┬────────────────╮
        │ field       │ value          │
        ├─────────────┼────────────────┤
        │ connected   │ yes            │
        │ car_service │ yes            │
        │ status      │ Ready to drive │
        ╰─────────────┴────────────────╯

        Discovered services:
        ╭──────────────────────────────────────┬──────────────────────────────────────┬──────────╮
        │ service_uuid                         │ characteristic_uuid                  │ endpoint │
        ├──────────────────────────────────────┼──────────────────────────────────────┼──────────┤
        │ 39d50000-9668-4b22-927c-f57eb67f8a77 │ 39d50003-9668-4b22-927c-f57eb67f8a77 │ turn     │
        ╰──────────────────────────────────────┴──────────────────────────────────────┴──────────╯
        ");
    }

    #[test]
    fn unconnected_car_reports_status() {
        let state = UiState::compose(false, Vec::new(), Some(car()), false, &[]);
        let painter = Painter::new(false);

        let rendered = InspectView::new(&state, &painter).to_string();

        assert!(rendered.contains("Unable to connect, try again..."));
        assert!(rendered.ends_with("Discovered services:\n<none>"));
    }

    #[test]
    fn no_device_selected() {
        let state = UiState::default();
        let painter = Painter::new(false);
        assert_snapshot!(InspectView::new(&state, &painter).to_string(), @"No device selected.");
    }
}
