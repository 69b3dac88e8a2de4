use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

use super::ui_state::UiState;
use crate::drive::{Direction, Speed};
use crate::error::InteractionError;
use crate::hw::{DeviceConnection, FoundDevice, HardwareClient, Scanner, ServiceInfo};

type ActiveConnection = Option<Arc<DeviceConnection>>;

/// Aggregates scanner and connection state into one [`UiState`].
///
/// Must be created inside a tokio runtime; the aggregation runs on a
/// spawned task until [`CarViewModel::shutdown`] or drop.
#[derive(Debug)]
pub struct CarViewModel {
    hardware: Arc<dyn HardwareClient>,
    scanner: Scanner,
    active: watch::Sender<ActiveConnection>,
    ui_state: Arc<watch::Sender<UiState>>,
    cancel: CancellationToken,
    aggregation: Mutex<Option<JoinHandle<()>>>,
}

impl CarViewModel {
    /// Creates the view model and starts aggregating.
    ///
    /// With a `service_filter`, the scanner only publishes devices
    /// advertising that service.
    #[must_use]
    pub fn new(hardware: Arc<dyn HardwareClient>, service_filter: Option<Uuid>) -> Self {
        let scanner = Scanner::new(Arc::clone(&hardware), service_filter);
        let active = watch::Sender::new(None);
        let ui_state = Arc::new(watch::Sender::new(UiState::default()));
        let cancel = CancellationToken::new();

        let sources = Sources {
            found_devices: scanner.found_devices(),
            is_scanning: scanner.is_scanning(),
            active: active.subscribe(),
        };
        let handle = tokio::spawn(
            aggregate(sources, Arc::clone(&ui_state), cancel.clone()).in_current_span(),
        );

        Self {
            hardware,
            scanner,
            active,
            ui_state,
            cancel,
            aggregation: Mutex::new(Some(handle)),
        }
    }

    /// Subscribes to the aggregated state.
    #[must_use]
    pub fn ui_state(&self) -> watch::Receiver<UiState> {
        self.ui_state.subscribe()
    }

    /// Streams the aggregated state, starting with the current value.
    #[must_use]
    pub fn ui_updates(&self) -> WatchStream<UiState> {
        WatchStream::new(self.ui_state.subscribe())
    }

    /// Composes a state straight from the sources, without waiting for the
    /// aggregation task to catch up.
    #[must_use]
    pub fn snapshot(&self) -> UiState {
        let is_scanning = *self.scanner.is_scanning().borrow();
        let found_devices = self.scanner.found_devices().borrow().clone();
        let active = self.active.borrow().clone();
        match active {
            None => UiState::compose(is_scanning, found_devices, None, false, &[]),
            Some(connection) => {
                let is_connected = *connection.is_connected().borrow();
                let services = connection.services().borrow().clone();
                UiState::compose(
                    is_scanning,
                    found_devices,
                    Some(connection.device().clone()),
                    is_connected,
                    &services,
                )
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot start a scan.
    pub async fn start_scanning(&self) -> Result<(), InteractionError> {
        self.scanner.start_scanning().await
    }

    pub async fn stop_scanning(&self) {
        self.scanner.stop_scanning().await;
    }

    /// Makes `device` the active device, disconnecting the previous one first.
    #[instrument(skip(self, device), level = "info", fields(device_id = device.as_ref().map(FoundDevice::device_id)))]
    pub async fn set_active_device(&self, device: Option<FoundDevice>) {
        let previous = self.active.borrow().clone();
        if let Some(previous) = previous {
            debug!(
                previous_device_id = previous.device().device_id(),
                "releasing previous device"
            );
            previous.disconnect().await;
        }

        let connection = device
            .map(|device| Arc::new(DeviceConnection::new(Arc::clone(&self.hardware), device)));
        self.active.send_replace(connection);
    }

    pub async fn connect_active_device(&self) {
        if let Some(connection) = self.active_connection() {
            connection.connect().await;
        }
    }

    pub async fn disconnect_active_device(&self) {
        if let Some(connection) = self.active_connection() {
            connection.disconnect().await;
        }
    }

    pub async fn discover_active_device_services(&self) {
        if let Some(connection) = self.active_connection() {
            connection.discover_services().await;
        }
    }

    pub async fn write_direction(&self, direction: Direction) {
        if let Some(connection) = self.active_connection() {
            connection.write_direction(direction.byte()).await;
        }
    }

    pub async fn write_speed(&self, speed: Speed) {
        if let Some(connection) = self.active_connection() {
            connection.write_speed(speed.value()).await;
        }
    }

    pub async fn write_turn(&self, turn: u8) {
        if let Some(connection) = self.active_connection() {
            connection.write_turn(turn).await;
        }
    }

    /// Starts the retrying turn reset on the active device, if any.
    pub fn reset_turn(&self) -> Option<JoinHandle<bool>> {
        self.active_connection()
            .map(|connection| connection.reset_turn())
    }

    /// Stops scanning, releases the active device and ends aggregation.
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) {
        self.scanner.stop_scanning().await;
        self.disconnect_active_device().await;
        self.cancel.cancel();
        if let Some(handle) = self.aggregation.lock().await.take()
            && let Err(error) = handle.await
        {
            warn!(?error, "aggregation task ended abnormally");
        }
        info!("view model shut down");
    }

    fn active_connection(&self) -> ActiveConnection {
        self.active.borrow().clone()
    }
}

impl Drop for CarViewModel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Sources {
    found_devices: watch::Receiver<Vec<FoundDevice>>,
    is_scanning: watch::Receiver<bool>,
    active: watch::Receiver<ActiveConnection>,
}

/// Receivers of the connection currently in the active slot.
struct ConnectionWatch {
    device: FoundDevice,
    is_connected: watch::Receiver<bool>,
    services: watch::Receiver<Vec<ServiceInfo>>,
}

impl ConnectionWatch {
    fn follow(active: &ActiveConnection) -> Option<Self> {
        active.as_ref().map(|connection| Self {
            device: connection.device().clone(),
            is_connected: connection.is_connected(),
            services: connection.services(),
        })
    }
}

/// Resolves when the followed connection publishes a change. Never resolves
/// while nothing is followed.
async fn connection_changed(connection: &mut Option<ConnectionWatch>) {
    let Some(watch) = connection.as_mut() else {
        return std::future::pending().await;
    };
    let result = tokio::select! {
        result = watch.is_connected.changed() => result,
        result = watch.services.changed() => result,
    };
    if result.is_err() {
        debug!("followed connection dropped");
        *connection = None;
    }
}

async fn aggregate(
    mut sources: Sources,
    ui_state: Arc<watch::Sender<UiState>>,
    cancel: CancellationToken,
) {
    let mut connection = ConnectionWatch::follow(&sources.active.borrow_and_update());
    publish(&mut sources, connection.as_mut(), &ui_state);

    loop {
        let active_changed = tokio::select! {
            () = cancel.cancelled() => break,
            Ok(()) = sources.found_devices.changed() => false,
            Ok(()) = sources.is_scanning.changed() => false,
            Ok(()) = sources.active.changed() => true,
            () = connection_changed(&mut connection) => false,
        };

        if active_changed {
            connection = ConnectionWatch::follow(&sources.active.borrow_and_update());
        }
        publish(&mut sources, connection.as_mut(), &ui_state);
    }

    debug!("aggregation stopped");
}

fn publish(
    sources: &mut Sources,
    connection: Option<&mut ConnectionWatch>,
    ui_state: &watch::Sender<UiState>,
) {
    let is_scanning = *sources.is_scanning.borrow_and_update();
    let found_devices = sources.found_devices.borrow_and_update().clone();
    let next = match connection {
        None => UiState::compose(is_scanning, found_devices, None, false, &[]),
        Some(watch) => {
            let is_connected = *watch.is_connected.borrow_and_update();
            let services = watch.services.borrow_and_update().clone();
            UiState::compose(
                is_scanning,
                found_devices,
                Some(watch.device.clone()),
                is_connected,
                &services,
            )
        }
    };

    ui_state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
