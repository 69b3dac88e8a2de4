use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::drive::DriveArgs;
use crate::cli::inspect::InspectArgs;
use crate::cli::scan::ScanArgs;
use crate::cli::steer::SteerArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{FakeBackendConfig, ScanFixture, WriteLog};

/// How long commands scan for a car before giving up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line options for the car controller.
#[derive(Debug, Parser)]
#[command(name = "lambcar", about = "Find and drive Lambcar BLE toy cars.")]
pub struct Args {
    /// Log level override; `RUST_LOG` is used when absent.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// How long to scan for the car to connect to (e.g. `10s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    scan_timeout: Option<Duration>,
    /// Uses the fake BLE backend with fixture-driven discovery.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|device_id|local_name|rssi[|services];...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    /// Makes every fake connection attempt fail.
    #[arg(long, global = true, requires = "fake")]
    fake_refuse_connect: bool,
    /// Makes fake devices expose a battery service instead of the car service.
    #[arg(long, global = true, requires = "fake")]
    fake_missing_service: bool,
    /// Number of fake writes to reject before accepting again.
    #[arg(long, global = true, requires = "fake")]
    fake_failing_writes: Option<usize>,
    /// Artificial fake service discovery delay (e.g. `200ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_service_discovery_delay: Option<Duration>,
    /// Makes the fake car drop each link this long after connecting (e.g. `3s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_drop_link_after: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use lambcar::{Args, Command, ScanArgs};
    ///
    /// let args = Args::new(Command::Scan(ScanArgs::default()));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output: None,
            scan_timeout: None,
            fake: false,
            fake_scan: None,
            fake_discovery_delay: None,
            fake_refuse_connect: false,
            fake_missing_service: false,
            fake_failing_writes: None,
            fake_service_discovery_delay: None,
            fake_drop_link_after: None,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            discovery_delay,
            refuse_connect,
            missing_service,
            failing_writes,
            service_discovery_delay,
            drop_link_after,
            write_log: _,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_discovery_delay = Some(discovery_delay);
        self.fake_refuse_connect = refuse_connect;
        self.fake_missing_service = missing_service;
        self.fake_failing_writes = Some(failing_writes);
        self.fake_service_discovery_delay = Some(service_discovery_delay);
        self.fake_drop_link_after = drop_link_after;
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout.unwrap_or(DEFAULT_SCAN_TIMEOUT)
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_discovery_delay,
            fake_refuse_connect,
            fake_missing_service,
            fake_failing_writes,
            fake_service_discovery_delay,
            fake_drop_link_after,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                refuse_connect: fake_refuse_connect,
                missing_service: fake_missing_service,
                failing_writes: fake_failing_writes.unwrap_or(0),
                service_discovery_delay: fake_service_discovery_delay.unwrap_or(Duration::ZERO),
                drop_link_after: fake_drop_link_after,
                write_log: WriteLog::default(),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake backend arguments for programmatic runs.
///
/// ```
/// let fake = lambcar::FakeArgs::builder()
///     .scan("hci0|AA:BB:CC|Lambcar|-43")?
///     .failing_writes(2)
///     .build();
/// let _ = lambcar::fake_hardware_client(fake);
/// # Ok::<(), lambcar::FixtureError>(())
/// ```
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(name = scan, with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
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
    /// The fake car drops every link this long after it connects.
    drop_link_after: Option<Duration>,
    /// Shared log the fake links record every write attempt into.
    #[builder(default)]
    write_log: WriteLog,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            discovery_delay,
            refuse_connect,
            missing_service,
            failing_writes,
            service_discovery_delay,
            drop_link_after,
            write_log,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .discovery_delay(discovery_delay)
            .refuse_connect(refuse_connect)
            .missing_service(missing_service)
            .failing_writes(failing_writes)
            .service_discovery_delay(service_discovery_delay)
            .maybe_drop_link_after(drop_link_after)
            .write_log(write_log)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for a while and list the cars found.
    Scan(ScanArgs),
    /// Connect to a car, discover its services and print them.
    Inspect(InspectArgs),
    /// Connect to a car and send one drive command.
    Drive(DriveArgs),
    /// Replay steering-wheel drag steps as turn commands, then centre the wheel.
    Steer(SteerArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Scan(_args) => "scan",
            Self::Inspect(_args) => "inspect",
            Self::Drive(_args) => "drive",
            Self::Steer(_args) => "steer",
        }
    }
}

/// Output rendering for command results.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured tables for people.
    #[default]
    Pretty,
    /// One JSON document per result.
    Json,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
