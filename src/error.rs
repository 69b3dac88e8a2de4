use thiserror::Error;
use uuid::Uuid;

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("device `{device_id}` is no longer visible to any adapter")]
    DeviceGone { device_id: String },
    #[error("no link is open to the device")]
    NotConnected,
    #[error("characteristic {characteristic} of service {service} was not found on the connected device")]
    MissingCharacteristic { service: Uuid, characteristic: Uuid },
    #[error("the fake device refused the connection")]
    FakeConnectRefused,
    #[error("the fake device rejected the write")]
    FakeWriteRejected,
    #[error("unable to connect to `{device_id}`, try again")]
    UnableToConnect { device_id: String },
    #[error("connected to `{device_id}` but it does not expose the car service")]
    MissingCarService { device_id: String },
    #[error("`{device_id}` did not accept the turn reset after {attempts} attempts")]
    TurnResetFailed { device_id: String, attempts: u32 },
    #[error("turn reset on `{device_id}` was aborted before it finished")]
    TurnResetAborted { device_id: String },
    #[error("no car was found within {timeout}", timeout = humantime::format_duration(*timeout))]
    NoDeviceFound { timeout: std::time::Duration },
    #[error("device `{device_id}` was not found within {timeout}", timeout = humantime::format_duration(*timeout))]
    SelectedDeviceNotFound {
        device_id: String,
        timeout: std::time::Duration,
    },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four or five pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("invalid advertised service `{value}`")]
    InvalidServiceUuid { value: String },
}

/// Errors returned when a command value falls outside what the car accepts.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum CommandValueError {
    #[error("turn {value} is out of range ({min}..={max})")]
    TurnOutOfRange { value: u8, min: u8, max: u8 },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
