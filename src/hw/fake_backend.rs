use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::hardware::{DeviceLink, HardwareClient};
use super::model::{CharacteristicInfo, FoundDevice, ServiceInfo};
use crate::error::{FixtureError, InteractionError};
use crate::protocol::{self, EndpointId};

const GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x0000_1800_0000_1000_8000_0080_5f9b_34fb);
const DEVICE_NAME_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000_2a00_0000_1000_8000_0080_5f9b_34fb);
const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_0080_5f9b_34fb);
const BATTERY_LEVEL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000_2a19_0000_1000_8000_0080_5f9b_34fb);

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// One write observed by the fake backend.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedWrite {
    characteristic: Uuid,
    payload: Vec<u8>,
    accepted: bool,
    at: Instant,
}

impl RecordedWrite {
    /// Returns the car endpoint written, if the UUID is a known one.
    #[must_use]
    pub fn endpoint(&self) -> Option<EndpointId> {
        protocol::endpoint_for_uuid(&self.characteristic)
    }

    /// Returns the written bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns whether the fake device accepted the write.
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.accepted
    }

    /// Returns when the write was attempted.
    #[must_use]
    pub fn at(&self) -> Instant {
        self.at
    }
}

/// Shared record of every write attempt against fake links.
#[derive(Debug, Clone, Default)]
pub struct WriteLog {
    entries: Arc<Mutex<Vec<RecordedWrite>>>,
}

impl WriteLog {
    /// Returns a copy of all recorded attempts in order.
    #[must_use]
    pub fn entries(&self) -> Vec<RecordedWrite> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the payloads accepted for one endpoint, in order.
    #[must_use]
    pub fn accepted_payloads(&self, endpoint: EndpointId) -> Vec<Vec<u8>> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.accepted && entry.endpoint() == Some(endpoint))
            .map(|entry| entry.payload)
            .collect()
    }

    fn push(&self, entry: RecordedWrite) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default)]
    refuse_connect: bool,
    #[builder(default)]
    missing_service: bool,
    #[builder(default)]
    failing_writes: usize,
    #[builder(default)]
    service_discovery_delay: Duration,
    drop_link_after: Option<Duration>,
    #[builder(default)]
    write_log: WriteLog,
}

/// Fake hardware client used in tests and non-hardware environments.
#[derive(Debug)]
pub(crate) struct FakeHardwareClient {
    devices: Vec<FoundDevice>,
    discovery_delay: Duration,
    scan_started_at: Mutex<Option<Instant>>,
    behaviour: Arc<LinkBehaviour>,
}

/// Behaviour shared by every link the fake client opens.
#[derive(Debug)]
struct LinkBehaviour {
    refuse_connect: bool,
    missing_service: bool,
    remaining_write_failures: AtomicUsize,
    service_discovery_delay: Duration,
    /// The car drops every link this long after it connects.
    drop_link_after: Option<Duration>,
    write_log: WriteLog,
}

impl FakeHardwareClient {
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        let FakeBackendConfig {
            scan_fixture,
            discovery_delay,
            refuse_connect,
            missing_service,
            failing_writes,
            service_discovery_delay,
            drop_link_after,
            write_log,
        } = config;

        Self {
            devices: scan_fixture.into(),
            discovery_delay,
            scan_started_at: Mutex::new(None),
            behaviour: Arc::new(LinkBehaviour {
                refuse_connect,
                missing_service,
                remaining_write_failures: AtomicUsize::new(failing_writes),
                service_discovery_delay,
                drop_link_after,
                write_log,
            }),
        }
    }

    fn scan_started_at(&self) -> Option<Instant> {
        *self
            .scan_started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn start_scan(&self, _service_filter: Option<Uuid>) -> Result<(), InteractionError> {
        *self
            .scan_started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        Ok(())
    }

    async fn discovered_devices(&self) -> Result<Vec<FoundDevice>, InteractionError> {
        let visible = self
            .scan_started_at()
            .is_some_and(|started_at| started_at.elapsed() >= self.discovery_delay);
        if !visible {
            return Ok(Vec::new());
        }
        Ok(self.devices.clone())
    }

    async fn stop_scan(&self) -> Result<(), InteractionError> {
        *self
            .scan_started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    async fn open_link(
        &self,
        device: &FoundDevice,
    ) -> Result<Box<dyn DeviceLink>, InteractionError> {
        let known = self
            .devices
            .iter()
            .any(|candidate| candidate.device_id() == device.device_id());
        if !known {
            return Err(InteractionError::DeviceGone {
                device_id: device.device_id().to_string(),
            });
        }

        Ok(Box::new(FakeLink {
            connected_at: Mutex::new(None),
            behaviour: Arc::clone(&self.behaviour),
        }))
    }
}

#[derive(Debug)]
struct FakeLink {
    connected_at: Mutex<Option<Instant>>,
    behaviour: Arc<LinkBehaviour>,
}

impl FakeLink {
    fn connected(&self) -> bool {
        let connected_at = *self
            .connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        connected_at.is_some_and(|connected_at| {
            self.behaviour
                .drop_link_after
                .is_none_or(|drop_after| connected_at.elapsed() < drop_after)
        })
    }

    fn ensure_connected(&self) -> Result<(), InteractionError> {
        if self.connected() {
            Ok(())
        } else {
            Err(InteractionError::NotConnected)
        }
    }

    fn set_connected_at(&self, connected_at: Option<Instant>) {
        *self
            .connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = connected_at;
    }

    fn take_write_failure(&self) -> bool {
        self.behaviour
            .remaining_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    async fn connect(&self) -> Result<(), InteractionError> {
        if self.behaviour.refuse_connect {
            return Err(InteractionError::FakeConnectRefused);
        }
        self.set_connected_at(Some(Instant::now()));
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, InteractionError> {
        Ok(self.connected())
    }

    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, InteractionError> {
        self.ensure_connected()?;
        // The answer is already in flight; a disconnect during the delay does not cancel it.
        sleep(self.behaviour.service_discovery_delay).await;
        Ok(fake_services(self.behaviour.missing_service))
    }

    #[instrument(skip(self, payload), level = "trace", fields(%characteristic))]
    async fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.ensure_connected()?;
        let exposed = fake_services(self.behaviour.missing_service)
            .iter()
            .any(|candidate| candidate.uuid() == service && candidate.has_characteristic(characteristic));
        if !exposed {
            return Err(InteractionError::MissingCharacteristic {
                service,
                characteristic,
            });
        }

        let accepted = !self.take_write_failure();
        self.behaviour.write_log.push(RecordedWrite {
            characteristic,
            payload: payload.to_vec(),
            accepted,
            at: Instant::now(),
        });
        if !accepted {
            debug!("fake device rejected write");
            return Err(InteractionError::FakeWriteRejected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), InteractionError> {
        self.set_connected_at(None);
        Ok(())
    }
}

fn fake_services(missing_service: bool) -> Vec<ServiceInfo> {
    let mut services = vec![ServiceInfo::new(
        GENERIC_ACCESS_SERVICE,
        vec![CharacteristicInfo::new(
            DEVICE_NAME_CHARACTERISTIC,
            vec!["read".to_string()],
        )],
    )];

    if missing_service {
        services.push(ServiceInfo::new(
            BATTERY_SERVICE,
            vec![CharacteristicInfo::new(
                BATTERY_LEVEL_CHARACTERISTIC,
                vec!["read".to_string(), "notify".to_string()],
            )],
        ));
    } else {
        let writable = [EndpointId::Direction, EndpointId::Speed, EndpointId::Turn]
            .into_iter()
            .map(|endpoint| {
                CharacteristicInfo::new(
                    protocol::endpoint_metadata(endpoint).uuid(),
                    vec!["read".to_string(), "write".to_string()],
                )
            })
            .collect();
        services.push(ServiceInfo::new(protocol::car_service_uuid(), writable));
    }

    services.sort_by_key(ServiceInfo::uuid);
    services
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<FoundDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

/// Parses `adapter|device_id|local_name|rssi[|services]`.
///
/// `services` is a comma-separated UUID list, `car` for the car service, or
/// `-` for none. When omitted the device advertises the car service.
fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if !(4..=5).contains(&fields.len()) {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = if fields[2] == "-" {
        None
    } else {
        Some(fields[2].to_string())
    };
    let rssi = if fields[3] == "-" {
        None
    } else {
        Some(fields[3].parse::<i16>()?)
    };
    let services = match fields.get(4) {
        None => vec![protocol::car_service_uuid()],
        Some(raw_services) => parse_services(raw_services)?,
    };

    Ok(FoundDevice::new(
        fields[0].to_string(),
        fields[1].to_string(),
        local_name,
        rssi,
    )
    .with_advertised_services(services))
}

fn parse_services(raw_services: &str) -> Result<Vec<Uuid>, FixtureError> {
    if raw_services == "-" {
        return Ok(Vec::new());
    }

    raw_services
        .split(',')
        .map(str::trim)
        .map(|value| {
            if value.eq_ignore_ascii_case("car") {
                return Ok(protocol::car_service_uuid());
            }
            Uuid::parse_str(value).map_err(|_| FixtureError::InvalidServiceUuid {
                value: value.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn config(fixture: &str) -> FakeBackendConfig {
        FakeBackendConfig::builder()
            .scan_fixture(fixture.parse().expect("fixture should parse"))
            .build()
    }

    #[rstest]
    #[case("hci0|AA:BB|Lambcar|-43", 1)]
    #[case("hci0|AA:BB|Lambcar|-43;hci1|CC:DD|Speaker|-55|-", 2)]
    fn parse_scan_fixture_parses_records(#[case] fixture: &str, #[case] expected_count: usize) {
        let devices = parse_scan_fixture(fixture).expect("fixture should parse");
        assert_eq!(expected_count, devices.len());
    }

    #[test]
    fn parse_scan_record_defaults_to_car_service() {
        let device = parse_scan_record("hci0|AA:BB|Lambcar|-43").expect("record should parse");
        assert!(device.advertises(protocol::car_service_uuid()));
    }

    #[test]
    fn parse_scan_record_accepts_explicit_services() {
        let device = parse_scan_record(
            "hci0|AA:BB|-|-|0000180f-0000-1000-8000-00805f9b34fb,car",
        )
        .expect("record should parse");

        assert_eq!(None, device.local_name());
        assert_eq!(None, device.rssi());
        assert_eq!(
            vec![BATTERY_SERVICE, protocol::car_service_uuid()],
            device.advertised_services()
        );
    }

    #[test]
    fn parse_scan_fixture_rejects_invalid_field_count() {
        let result = parse_scan_fixture("hci0|AA:BB|Lambcar");
        assert_matches!(result, Err(FixtureError::InvalidRecordFieldCount));
    }

    #[test]
    fn parse_scan_record_rejects_bad_service() {
        let result = parse_scan_record("hci0|AA:BB|Lambcar|-43|not-a-uuid");
        assert_matches!(result, Err(FixtureError::InvalidServiceUuid { value }) if value == "not-a-uuid");
    }

    #[tokio::test(start_paused = true)]
    async fn devices_appear_after_discovery_delay() {
        let client = FakeHardwareClient::new(
            FakeBackendConfig::builder()
                .scan_fixture("hci0|AA:BB|Lambcar|-43".parse().expect("fixture should parse"))
                .discovery_delay(Duration::from_millis(100))
                .build(),
        );

        client.start_scan(None).await.expect("scan should start");
        assert!(client.discovered_devices().await.expect("poll").is_empty());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(1, client.discovered_devices().await.expect("poll").len());
    }

    #[tokio::test]
    async fn writes_require_connection() {
        let client = FakeHardwareClient::new(config("hci0|AA:BB|Lambcar|-43"));
        let device = client.devices[0].clone();
        let link = client.open_link(&device).await.expect("link should open");
        let turn = protocol::endpoint_metadata(EndpointId::Turn).uuid();

        let result = link
            .write(protocol::car_service_uuid(), turn, &[90])
            .await;

        assert_matches!(result, Err(InteractionError::NotConnected));
    }

    #[tokio::test]
    async fn failing_writes_are_consumed_then_accepted() {
        let write_log = WriteLog::default();
        let client = FakeHardwareClient::new(
            FakeBackendConfig::builder()
                .scan_fixture("hci0|AA:BB|Lambcar|-43".parse().expect("fixture should parse"))
                .failing_writes(1)
                .write_log(write_log.clone())
                .build(),
        );
        let device = client.devices[0].clone();
        let link = client.open_link(&device).await.expect("link should open");
        link.connect().await.expect("connect should succeed");
        let speed = protocol::endpoint_metadata(EndpointId::Speed).uuid();

        let first = link
            .write(protocol::car_service_uuid(), speed, &[10])
            .await;
        let second = link
            .write(protocol::car_service_uuid(), speed, &[20])
            .await;

        assert_matches!(first, Err(InteractionError::FakeWriteRejected));
        assert_matches!(second, Ok(()));
        assert_eq!(vec![vec![20u8]], write_log.accepted_payloads(EndpointId::Speed));
        assert_eq!(2, write_log.entries().len());
    }

    #[tokio::test(start_paused = true)]
    async fn car_drops_link_after_configured_time() {
        let client = FakeHardwareClient::new(
            FakeBackendConfig::builder()
                .scan_fixture("hci0|AA:BB|Lambcar|-43".parse().expect("fixture should parse"))
                .drop_link_after(Duration::from_secs(1))
                .build(),
        );
        let device = client.devices[0].clone();
        let link = client.open_link(&device).await.expect("link should open");
        link.connect().await.expect("connect should succeed");
        assert_matches!(link.is_connected().await, Ok(true));

        tokio::time::advance(Duration::from_secs(1)).await;

        assert_matches!(link.is_connected().await, Ok(false));
        assert_matches!(link.discover_services().await, Err(InteractionError::NotConnected));
    }
}
