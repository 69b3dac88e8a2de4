use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument};

use crate::app::RunOptions;
use crate::cli::OutputFormat;
use crate::hw::{FoundDevice, HardwareClient};
use crate::protocol;
use crate::terminal::TerminalClient;
use crate::view::CarViewModel;

use super::ui::{Painter, ScanView};

const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// How long to scan (e.g. `5s`, `1500ms`).
    #[arg(long, default_value = "5s", value_parser = super::command::parse_duration)]
    duration: Duration,
    /// Lists every device found, not only those advertising the car service.
    #[arg(long)]
    all_devices: bool,
}

impl ScanArgs {
    /// Creates scan arguments.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// let args = lambcar::ScanArgs::new(Duration::from_secs(2), true);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(duration: Duration, all_devices: bool) -> Self {
        Self {
            duration,
            all_devices,
        }
    }
}

impl Default for ScanArgs {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_DURATION, false)
    }
}

#[derive(Serialize)]
struct ScanResult<'a> {
    devices: &'a [FoundDevice],
}

/// Executes the `scan` command.
#[instrument(skip(client, out, terminal_client, options), level = "info", fields(duration = ?args.duration, all_devices = args.all_devices))]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    args: &ScanArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    let service_filter = (!args.all_devices).then(protocol::car_service_uuid);
    let view_model = CarViewModel::new(Arc::from(client), service_filter);

    let started = view_model.start_scanning().await;
    if started.is_ok() {
        let deadline = Instant::now() + args.duration;
        tokio::select! {
            () = sleep_until(deadline) => {}
            interrupted = tokio::signal::ctrl_c() => match interrupted {
                Ok(()) => info!("scan interrupted"),
                Err(error) => {
                    debug!(?error, "failed to listen for ctrl-c");
                    sleep_until(deadline).await;
                }
            },
        }
    }
    let state = view_model.snapshot();
    view_model.shutdown().await;
    started?;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ScanView::new(state.found_devices(), &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer(
                &mut *out,
                &ScanResult {
                    devices: state.found_devices(),
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}
