use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

use super::hardware::HardwareClient;
use super::model::FoundDevice;
use crate::error::InteractionError;

/// How often the backend's peer list is polled while scanning.
pub const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Enumerates nearby devices and publishes what it finds.
#[derive(Debug)]
pub struct Scanner {
    hardware: Arc<dyn HardwareClient>,
    service_filter: Option<Uuid>,
    found_devices: Arc<watch::Sender<Vec<FoundDevice>>>,
    is_scanning: watch::Sender<bool>,
    poller: Mutex<Option<ScanPoller>>,
}

#[derive(Debug)]
struct ScanPoller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Scanner {
    /// Creates an idle scanner. With a `service_filter`, only devices
    /// advertising that service are published.
    #[must_use]
    pub fn new(hardware: Arc<dyn HardwareClient>, service_filter: Option<Uuid>) -> Self {
        Self {
            hardware,
            service_filter,
            found_devices: Arc::new(watch::Sender::new(Vec::new())),
            is_scanning: watch::Sender::new(false),
            poller: Mutex::new(None),
        }
    }

    /// Subscribes to the found-device list.
    #[must_use]
    pub fn found_devices(&self) -> watch::Receiver<Vec<FoundDevice>> {
        self.found_devices.subscribe()
    }

    /// Subscribes to the scanning flag.
    #[must_use]
    pub fn is_scanning(&self) -> watch::Receiver<bool> {
        self.is_scanning.subscribe()
    }

    /// Starts discovery and the background poll. A no-op while already scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a scan.
    #[instrument(skip(self), level = "info", fields(service_filter = ?self.service_filter))]
    pub async fn start_scanning(&self) -> Result<(), InteractionError> {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            debug!("already scanning");
            return Ok(());
        }

        self.hardware.start_scan(self.service_filter).await?;
        self.found_devices.send_replace(Vec::new());
        self.is_scanning.send_replace(true);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            poll_devices(
                Arc::clone(&self.hardware),
                self.service_filter,
                Arc::clone(&self.found_devices),
                cancel.clone(),
            )
            .in_current_span(),
        );
        *poller = Some(ScanPoller { cancel, handle });
        info!("scan started");
        Ok(())
    }

    /// Stops the background poll and discovery. A no-op when idle.
    #[instrument(skip(self), level = "info")]
    pub async fn stop_scanning(&self) {
        let Some(ScanPoller { cancel, handle }) = self.poller.lock().await.take() else {
            return;
        };

        cancel.cancel();
        if let Err(error) = handle.await {
            warn!(?error, "scan poll task ended abnormally");
        }
        if let Err(error) = self.hardware.stop_scan().await {
            debug!(?error, "failed to stop scan cleanly");
        }
        self.is_scanning.send_replace(false);
        info!("scan stopped");
    }
}

async fn poll_devices(
    hardware: Arc<dyn HardwareClient>,
    service_filter: Option<Uuid>,
    found_devices: Arc<watch::Sender<Vec<FoundDevice>>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(SCAN_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let devices = match hardware.discovered_devices().await {
            Ok(devices) => devices,
            Err(error) => {
                debug!(?error, "failed to poll discovered devices");
                continue;
            }
        };
        let devices = retain_matching(devices, service_filter);
        found_devices.send_if_modified(|current| {
            if *current == devices {
                return false;
            }
            debug!(device_count = devices.len(), "found devices changed");
            *current = devices;
            true
        });
    }
}

/// Drops devices not advertising `service_filter` and duplicates reported by
/// more than one adapter. Some stacks ignore the platform scan filter, so the
/// advertisement is checked again here.
fn retain_matching(devices: Vec<FoundDevice>, service_filter: Option<Uuid>) -> Vec<FoundDevice> {
    let mut kept: Vec<FoundDevice> = Vec::with_capacity(devices.len());
    for device in devices {
        if service_filter.is_some_and(|service| !device.advertises(service)) {
            continue;
        }
        if kept
            .iter()
            .any(|existing| existing.device_id() == device.device_id())
        {
            continue;
        }
        kept.push(device);
    }
    kept
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::fake_backend::{FakeBackendConfig, FakeHardwareClient};
    use crate::protocol;

    fn scanner(fixture: &str, service_filter: Option<Uuid>) -> Scanner {
        let config = FakeBackendConfig::builder()
            .scan_fixture(fixture.parse().expect("fixture should parse"))
            .build();
        Scanner::new(Arc::new(FakeHardwareClient::new(config)), service_filter)
    }

    fn device(id: &str, services: Vec<Uuid>) -> FoundDevice {
        FoundDevice::new("hci0".into(), id.into(), None, None).with_advertised_services(services)
    }

    #[test]
    fn retain_matching_filters_and_dedupes() {
        let car = protocol::car_service_uuid();
        let devices = vec![
            device("AA", vec![car]),
            device("BB", Vec::new()),
            device("AA", vec![car]),
        ];

        let kept = retain_matching(devices, Some(car));

        assert_eq!(vec![device("AA", vec![car])], kept);
    }

    #[test]
    fn retain_matching_without_filter_keeps_everything_once() {
        let devices = vec![device("AA", Vec::new()), device("BB", Vec::new())];
        assert_eq!(2, retain_matching(devices, None).len());
    }

    #[tokio::test(start_paused = true)]
    async fn scanning_publishes_filtered_devices() {
        let scanner = scanner(
            "hci0|AA:BB:CC|Lambcar|-43;hci0|00:11:22|Speaker|-65|-",
            Some(protocol::car_service_uuid()),
        );
        let mut found = scanner.found_devices();

        scanner.start_scanning().await.expect("scan should start");
        assert_eq!(true, *scanner.is_scanning().borrow());

        let devices = found
            .wait_for(|devices| !devices.is_empty())
            .await
            .expect("scanner should stay alive")
            .clone();
        assert_eq!(
            vec!["AA:BB:CC"],
            devices
                .iter()
                .map(FoundDevice::device_id)
                .collect::<Vec<_>>()
        );

        scanner.stop_scanning().await;
        assert_eq!(false, *scanner.is_scanning().borrow());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let scanner = scanner("hci0|AA:BB:CC|Lambcar|-43", None);

        scanner.stop_scanning().await;

        assert_eq!(false, *scanner.is_scanning().borrow());
    }
}
