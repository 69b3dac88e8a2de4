mod app;
mod cli;
mod drive;
mod error;
mod hw;
mod protocol;
mod telemetry;
mod terminal;
mod utils;
mod view;

pub use app::{
    RunOptions, SessionHandler, fake_hardware_client, real_hardware_client, run,
    run_with_clients,
};
pub use cli::{
    Args, Command, DEFAULT_SCAN_TIMEOUT, DirectionArg, DriveAction, DriveArgs, FakeArgs,
    InspectArgs, LogLevel, OutputFormat, ScanArgs, SteerArgs,
};
pub use drive::{
    DEFAULT_TURN_DEBOUNCE, DRAG_UNITS_PER_DEGREE, Direction, MAX_STEERING_ANGLE, Speed,
    SteerMode, SteeringWheel, Turn, TurnDebouncer, angle_for_turn_byte, turn_byte,
};
pub use error::{CommandValueError, FixtureError, InteractionError};
pub use hw::{
    CharacteristicInfo, DeviceConnection, DeviceLink, FoundDevice, HardwareClient,
    LINK_POLL_INTERVAL, RESET_TURN_ATTEMPTS, RESET_TURN_RETRY_DELAY, RecordedWrite, RetryPolicy,
    SCAN_POLL_INTERVAL, Scanner, ServiceInfo, WriteLog,
};
pub use protocol::{EndpointId, NEUTRAL_TURN, car_service_uuid};
pub use terminal::{SystemTerminalClient, TerminalClient};
pub use view::{CarViewModel, DriveReadiness, UiState};
