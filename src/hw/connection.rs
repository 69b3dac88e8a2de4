use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, trace, warn};

use super::hardware::{DeviceLink, HardwareClient};
use super::model::{FoundDevice, ServiceInfo};
use crate::protocol::{self, EndpointId, NEUTRAL_TURN};

/// Attempts made by [`DeviceConnection::reset_turn`].
pub const RESET_TURN_ATTEMPTS: u32 = 5;
/// Pause between failed turn-reset attempts.
pub const RESET_TURN_RETRY_DELAY: Duration = Duration::from_millis(20);
/// How often an open link is checked for a drop by the car.
pub const LINK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded retry settings for a write.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy making at most `max_attempts` writes, sleeping `delay`
    /// after each failed one that is followed by another attempt.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RESET_TURN_ATTEMPTS, RESET_TURN_RETRY_DELAY)
    }
}

#[derive(Debug)]
struct OpenLink {
    link: Arc<dyn DeviceLink>,
    monitor: CancellationToken,
}

/// The link slot and what it publishes, shared with the link monitor.
#[derive(Debug, Clone)]
struct LinkState {
    slot: Arc<Mutex<Option<OpenLink>>>,
    is_connected: Arc<watch::Sender<bool>>,
    services: Arc<watch::Sender<Vec<ServiceInfo>>>,
}

impl LinkState {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            is_connected: Arc::new(watch::Sender::new(false)),
            services: Arc::new(watch::Sender::new(Vec::new())),
        }
    }

    /// Publishes `services` unless `link` was released while they were
    /// being discovered.
    async fn publish_services(&self, link: &Arc<dyn DeviceLink>, services: Vec<ServiceInfo>) {
        let slot = self.slot.lock().await;
        if !holds(&slot, link) {
            debug!("link released during discovery, dropping services");
            return;
        }
        info!(service_count = services.len(), "services discovered");
        self.services.send_replace(services);
    }

    /// Releases `link` after the car dropped it, unless it was already
    /// replaced or torn down.
    async fn release_dropped(&self, link: &Arc<dyn DeviceLink>) {
        let mut slot = self.slot.lock().await;
        if !holds(&slot, link) {
            return;
        }
        *slot = None;
        self.is_connected.send_replace(false);
        self.services.send_replace(Vec::new());
    }
}

fn holds(slot: &Option<OpenLink>, link: &Arc<dyn DeviceLink>) -> bool {
    slot.as_ref()
        .is_some_and(|open| Arc::ptr_eq(&open.link, link))
}

/// Connection to one car.
///
/// Holds at most one open link. Connection state and discovered services are
/// published through `watch` channels; callers never get connect or write
/// errors back, only the observable state and log lines. A link the car drops
/// on its own is noticed within [`LINK_POLL_INTERVAL`] and released.
#[derive(Debug)]
pub struct DeviceConnection {
    device: FoundDevice,
    hardware: Arc<dyn HardwareClient>,
    state: LinkState,
    cancel: CancellationToken,
}

impl DeviceConnection {
    /// Creates a disconnected connection to `device`.
    #[must_use]
    pub fn new(hardware: Arc<dyn HardwareClient>, device: FoundDevice) -> Self {
        Self {
            device,
            hardware,
            state: LinkState::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the device this connection targets.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        &self.device
    }

    /// Subscribes to the connected flag.
    #[must_use]
    pub fn is_connected(&self) -> watch::Receiver<bool> {
        self.state.is_connected.subscribe()
    }

    /// Subscribes to the discovered services.
    #[must_use]
    pub fn services(&self) -> watch::Receiver<Vec<ServiceInfo>> {
        self.state.services.subscribe()
    }

    /// Opens the link and, once connected, discovers services.
    ///
    /// Failures are logged and leave the connection disconnected.
    #[instrument(skip(self), level = "info", fields(device_id = self.device.device_id()))]
    pub async fn connect(&self) {
        let mut slot = self.state.slot.lock().await;
        if slot.is_some() {
            debug!("already connected");
            return;
        }

        let link: Arc<dyn DeviceLink> = match self.hardware.open_link(&self.device).await {
            Ok(link) => Arc::from(link),
            Err(error) => {
                warn!(?error, "failed to open link");
                self.state.is_connected.send_replace(false);
                return;
            }
        };
        if let Err(error) = link.connect().await {
            warn!(?error, "failed to connect");
            self.state.is_connected.send_replace(false);
            return;
        }

        let monitor = self.cancel.child_token();
        tokio::spawn(
            monitor_link(Arc::clone(&link), self.state.clone(), monitor.clone()).in_current_span(),
        );
        *slot = Some(OpenLink {
            link: Arc::clone(&link),
            monitor,
        });
        self.state.is_connected.send_replace(true);
        drop(slot);
        info!("connected");

        self.discover_on(&link).await;
    }

    /// Re-runs service discovery on the open link, if any.
    #[instrument(skip(self), level = "debug", fields(device_id = self.device.device_id()))]
    pub async fn discover_services(&self) {
        let Some(link) = self.current_link().await else {
            debug!("no open link, skipping discovery");
            return;
        };
        self.discover_on(&link).await;
    }

    /// Tears down the link and releases it.
    ///
    /// Always leaves the connection disconnected with no services.
    #[instrument(skip(self), level = "info", fields(device_id = self.device.device_id()))]
    pub async fn disconnect(&self) {
        debug!("disconnecting");
        let open = self.state.slot.lock().await.take();
        if let Some(OpenLink { link, monitor }) = open {
            monitor.cancel();
            if let Err(error) = link.disconnect().await {
                warn!(?error, "failed to disconnect cleanly");
            }
        }
        self.state.is_connected.send_replace(false);
        self.state.services.send_replace(Vec::new());
    }

    pub async fn write_direction(&self, value: u8) {
        self.write_best_effort(EndpointId::Direction, value).await;
    }

    pub async fn write_speed(&self, value: u8) {
        self.write_best_effort(EndpointId::Speed, value).await;
    }

    pub async fn write_turn(&self, value: u8) {
        self.write_best_effort(EndpointId::Turn, value).await;
    }

    /// Writes the neutral turn byte on a background task, retrying with
    /// [`RetryPolicy::default`].
    ///
    /// The handle resolves to whether the car accepted the write.
    pub fn reset_turn(self: &Arc<Self>) -> JoinHandle<bool> {
        let connection = Arc::clone(self);
        tokio::spawn(
            async move {
                let reset = connection
                    .write_with_retry(EndpointId::Turn, &[NEUTRAL_TURN], RetryPolicy::default())
                    .await;
                if reset {
                    info!("reset turn");
                } else {
                    warn!("failed to reset turn");
                }
                reset
            }
            .in_current_span(),
        )
    }

    /// Writes `payload` to `endpoint` until it is accepted or `policy` runs out.
    ///
    /// Returns `false` straight away when the endpoint was not discovered.
    #[instrument(skip(self, payload), level = "debug", fields(%endpoint, ?policy))]
    pub async fn write_with_retry(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        policy: RetryPolicy,
    ) -> bool {
        let Some(link) = self.writable_link(endpoint).await else {
            debug!("endpoint not available, nothing to retry");
            return false;
        };
        let (service, characteristic) = endpoint_uuids(endpoint);

        for attempt in 1..=policy.max_attempts {
            match link.write(service, characteristic, payload).await {
                Ok(()) => {
                    debug!(attempt, "write accepted");
                    return true;
                }
                Err(error) => {
                    debug!(attempt, ?error, "write attempt failed");
                    if attempt < policy.max_attempts {
                        sleep(policy.delay).await;
                    }
                }
            }
        }

        false
    }

    async fn write_best_effort(&self, endpoint: EndpointId, value: u8) {
        let Some(link) = self.writable_link(endpoint).await else {
            trace!(%endpoint, value, "endpoint not available, skipping write");
            return;
        };
        let (service, characteristic) = endpoint_uuids(endpoint);

        match link.write(service, characteristic, &[value]).await {
            Ok(()) => trace!(%endpoint, value, "write succeeded"),
            Err(error) => debug!(%endpoint, value, ?error, "write failed"),
        }
    }

    async fn discover_on(&self, link: &Arc<dyn DeviceLink>) {
        match link.discover_services().await {
            Ok(services) => self.state.publish_services(link, services).await,
            Err(error) => warn!(?error, "service discovery failed"),
        }
    }

    async fn current_link(&self) -> Option<Arc<dyn DeviceLink>> {
        self.state
            .slot
            .lock()
            .await
            .as_ref()
            .map(|open| Arc::clone(&open.link))
    }

    /// Returns the open link if `endpoint` was discovered on it.
    async fn writable_link(&self, endpoint: EndpointId) -> Option<Arc<dyn DeviceLink>> {
        let link = self.current_link().await?;
        let (service, characteristic) = endpoint_uuids(endpoint);
        let discovered = self.state.services.borrow().iter().any(|candidate| {
            candidate.uuid() == service && candidate.has_characteristic(characteristic)
        });
        discovered.then_some(link)
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Polls `link` until the car drops it or `cancel` fires, then releases it.
async fn monitor_link(link: Arc<dyn DeviceLink>, state: LinkState, cancel: CancellationToken) {
    let mut ticker = interval(LINK_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match link.is_connected().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("connection lost");
                break;
            }
            Err(error) => {
                warn!(?error, "failed to check connection state");
                break;
            }
        }
    }

    state.release_dropped(&link).await;
}

fn endpoint_uuids(endpoint: EndpointId) -> (uuid::Uuid, uuid::Uuid) {
    (
        protocol::car_service_uuid(),
        protocol::endpoint_metadata(endpoint).uuid(),
    )
}
