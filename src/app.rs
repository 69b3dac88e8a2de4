use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bon::Builder;
use owo_colors::OwoColorize;
use tokio::time::timeout;
use tracing::{debug, info, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{Command, DEFAULT_SCAN_TIMEOUT, FakeArgs, LogLevel, OutputFormat};
use crate::error::InteractionError;
use crate::hw::{
    FoundDevice, HardwareClient, fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::protocol;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};
use crate::view::{CarViewModel, DriveReadiness};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Settings shared by every command run.
#[derive(Debug, Clone, Copy, Builder)]
pub struct RunOptions {
    log_level: Option<LogLevel>,
    #[builder(default)]
    output_format: OutputFormat,
    #[builder(default = DEFAULT_SCAN_TIMEOUT)]
    scan_timeout: Duration,
}

impl RunOptions {
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Finds a car, makes it the active device and connects to it.
pub struct SessionHandler {
    hardware_client: Arc<dyn HardwareClient>,
    device_id: Option<String>,
    scan_timeout: Duration,
}

impl SessionHandler {
    /// Creates a handler that picks the first car advertising the car service.
    ///
    /// ```
    /// let handler = lambcar::SessionHandler::new(lambcar::real_hardware_client());
    /// let _ = handler;
    /// ```
    #[must_use]
    pub fn new(hardware_client: Box<dyn HardwareClient>) -> Self {
        Self {
            hardware_client: Arc::from(hardware_client),
            device_id: None,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Picks the device with this backend id instead, whatever it advertises.
    #[must_use]
    pub fn with_device_id(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    #[must_use]
    pub fn with_scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    /// Selects and connects to a car, whether or not the connection comes up.
    ///
    /// The returned view model reflects the outcome in its state. Callers
    /// shut it down when done.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot start or no matching device shows
    /// up before the scan timeout.
    #[instrument(skip(self), level = "info", fields(device_id = self.device_id.as_deref(), scan_timeout = ?self.scan_timeout))]
    pub async fn open(self) -> Result<CarViewModel, InteractionError> {
        let span = tracing::Span::current();
        span.pb_set_message("Scanning for cars");

        let view_model = CarViewModel::new(Arc::clone(&self.hardware_client), None);
        let device = match self.find_device(&view_model).await {
            Ok(device) => device,
            Err(error) => {
                view_model.shutdown().await;
                span.pb_set_finish_message(&format!("{} No car found", "✗".red()));
                return Err(error);
            }
        };

        span.pb_set_message(&format!("Connecting to {}", device.device_id()));
        view_model.set_active_device(Some(device)).await;
        view_model.connect_active_device().await;
        Ok(view_model)
    }

    /// Selects and connects to a car that is ready to drive.
    ///
    /// # Errors
    ///
    /// Returns an error if no device is found, the connection does not come
    /// up, or the device lacks the car service.
    #[instrument(skip(self), level = "info")]
    pub async fn connect(self) -> Result<CarViewModel, InteractionError> {
        let view_model = self.open().await?;
        let state = view_model.snapshot();
        let device_id = state
            .active_device()
            .map(|device| device.device_id().to_string())
            .unwrap_or_default();

        let error = match state.readiness() {
            DriveReadiness::Ready => {
                tracing::Span::current()
                    .pb_set_finish_message(&format!("{} Connected", "✓".green()));
                info!(device_id, "car ready");
                return Ok(view_model);
            }
            DriveReadiness::NoDevice | DriveReadiness::NotConnected => {
                InteractionError::UnableToConnect { device_id }
            }
            DriveReadiness::AwaitingService => InteractionError::MissingCarService { device_id },
        };

        view_model.shutdown().await;
        tracing::Span::current()
            .pb_set_finish_message(&format!("{} Connection failed", "✗".red()));
        Err(error)
    }

    async fn find_device(&self, view_model: &CarViewModel) -> Result<FoundDevice, InteractionError> {
        let mut ui_state = view_model.ui_state();
        view_model.start_scanning().await?;

        let selected = timeout(self.scan_timeout, async {
            let state = ui_state
                .wait_for(|state| self.pick(state.found_devices()).is_some())
                .await
                .ok()?;
            self.pick(state.found_devices()).cloned()
        })
        .await;
        view_model.stop_scanning().await;

        match (selected, self.device_id.as_ref()) {
            (Ok(Some(device)), _) => {
                debug!(device_id = device.device_id(), "selected device");
                Ok(device)
            }
            (_, Some(device_id)) => Err(InteractionError::SelectedDeviceNotFound {
                device_id: device_id.clone(),
                timeout: self.scan_timeout,
            }),
            (_, None) => Err(InteractionError::NoDeviceFound {
                timeout: self.scan_timeout,
            }),
        }
    }

    fn pick<'a>(&self, devices: &'a [FoundDevice]) -> Option<&'a FoundDevice> {
        match self.device_id.as_deref() {
            Some(device_id) => devices
                .iter()
                .find(|device| device.device_id().eq_ignore_ascii_case(device_id)),
            None => devices
                .iter()
                .find(|device| device.advertises(protocol::car_service_uuid())),
        }
    }
}

/// Runs the CLI command against the process terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = lambcar::Args::try_parse_from([
///     "lambcar",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|Lambcar|-43",
///     "inspect",
/// ])?;
/// let options = lambcar::RunOptions::builder()
///     .maybe_log_level(args.log_level())
///     .scan_timeout(args.scan_timeout())
///     .build();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => lambcar::fake_hardware_client(fake_args),
///     None => lambcar::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// lambcar::run(command, &mut out, hardware_client, options).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        out,
        &SystemTerminalClient,
        hardware_client,
        options,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl lambcar::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = lambcar::Args::try_parse_from([
///     "lambcar",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|Lambcar|-43",
///     "drive",
///     "speed",
///     "120",
/// ])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => lambcar::fake_hardware_client(fake_args),
///     None => lambcar::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// lambcar::run_with_clients(
///     command,
///     &mut out,
///     &FakeTerminal,
///     hardware_client,
///     lambcar::RunOptions::default(),
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client),
    level = "info",
    fields(command = command.name())
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "lambcar",
        terminal_client.stderr_is_terminal(),
        options.log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Scan(args) => {
            crate::cli::scan::run(hardware_client, &args, out, terminal_client, options).await
        }
        Command::Inspect(args) => {
            crate::cli::inspect::run(hardware_client, &args, out, terminal_client, options).await
        }
        Command::Drive(args) => {
            crate::cli::drive::run(hardware_client, &args, out, terminal_client, options).await
        }
        Command::Steer(args) => {
            crate::cli::steer::run(hardware_client, &args, out, terminal_client, options).await
        }
    }
}
