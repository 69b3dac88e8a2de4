pub(crate) mod command;
pub(crate) mod drive;
pub(crate) mod inspect;
pub(crate) mod scan;
pub(crate) mod steer;
pub(crate) mod ui;

pub use self::command::{Args, Command, DEFAULT_SCAN_TIMEOUT, FakeArgs, LogLevel, OutputFormat};
pub use self::drive::{DirectionArg, DriveAction, DriveArgs};
pub use self::inspect::InspectArgs;
pub use self::scan::ScanArgs;
pub use self::steer::SteerArgs;
