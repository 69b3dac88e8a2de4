use std::collections::BTreeMap;
use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::instrument;

use crate::SessionHandler;
use crate::app::RunOptions;
use crate::cli::OutputFormat;
use crate::hw::{FoundDevice, HardwareClient};
use crate::terminal::TerminalClient;
use crate::view::DriveReadiness;

use super::ui::{InspectView, Painter};

/// Arguments for the `inspect` command.
#[derive(Debug, Default, Args)]
pub struct InspectArgs {
    /// Backend id of the device to inspect; defaults to the first car found.
    #[arg(long)]
    device: Option<String>,
}

impl InspectArgs {
    /// Creates inspect arguments.
    ///
    /// ```
    /// let args = lambcar::InspectArgs::new(Some("AA:BB:CC".to_string()));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

#[derive(Serialize)]
struct InspectReport<'a> {
    device: Option<&'a FoundDevice>,
    is_connected: bool,
    readiness: DriveReadiness,
    discovered_characteristics: &'a BTreeMap<String, Vec<String>>,
}

/// Executes the `inspect` command.
#[instrument(skip(client, args, out, terminal_client, options), level = "info")]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    args: &InspectArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    let view_model = SessionHandler::new(client)
        .with_device_id(args.device.clone())
        .with_scan_timeout(options.scan_timeout())
        .open()
        .await?;
    let state = view_model.snapshot();
    view_model.shutdown().await;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", InspectView::new(&state, &painter))?;
        }
        OutputFormat::Json => {
            let report = InspectReport {
                device: state.active_device(),
                is_connected: state.is_device_connected(),
                readiness: state.readiness(),
                discovered_characteristics: state.discovered_characteristics(),
            };
            serde_json::to_writer(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
