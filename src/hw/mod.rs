mod btleplug_backend;
mod connection;
mod fake_backend;
mod hardware;
mod model;
mod scanner;

pub use self::connection::{
    DeviceConnection, LINK_POLL_INTERVAL, RESET_TURN_ATTEMPTS, RESET_TURN_RETRY_DELAY, RetryPolicy,
};
pub(crate) use self::fake_backend::{FakeBackendConfig, ScanFixture};
pub use self::fake_backend::{RecordedWrite, WriteLog};
pub use self::hardware::{DeviceLink, HardwareClient};
pub(crate) use self::hardware::{fake_hardware_client, real_hardware_client};
pub use self::model::{CharacteristicInfo, FoundDevice, ServiceInfo};
pub use self::scanner::{SCAN_POLL_INTERVAL, Scanner};
