use std::io;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{instrument, warn};

use crate::app::RunOptions;
use crate::cli::OutputFormat;
use crate::drive::{Direction, Speed, Turn};
use crate::error::{CommandValueError, InteractionError};
use crate::hw::{HardwareClient, RESET_TURN_ATTEMPTS};
use crate::terminal::TerminalClient;
use crate::view::CarViewModel;
use crate::SessionHandler;

use super::ui::{DriveResultView, Painter};

/// JSON result emitted by a `drive` action.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum DriveResult {
    Direction { direction: Direction, byte: u8 },
    Speed { speed: u8 },
    Turn { turn: u8 },
    ResetTurn { turn: u8 },
}

/// Arguments for the `drive` command.
#[derive(Debug, Args)]
pub struct DriveArgs {
    /// Backend id of the car; defaults to the first car found.
    #[arg(long)]
    device: Option<String>,
    #[command(subcommand)]
    action: DriveAction,
}

impl DriveArgs {
    /// Creates drive arguments for one action.
    ///
    /// ```
    /// use lambcar::{DirectionArg, DriveAction, DriveArgs};
    ///
    /// let args = DriveArgs::new(None, DriveAction::Direction { direction: DirectionArg::Reverse });
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(device: Option<String>, action: DriveAction) -> Self {
        Self { device, action }
    }
}

/// Command sent by `drive`.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum DriveAction {
    /// Set the drive direction.
    Direction {
        #[arg(value_enum)]
        direction: DirectionArg,
    },
    /// Set the motor speed (0..=255).
    Speed { speed: u8 },
    /// Set the turn byte (0..=180, 90 is straight ahead).
    Turn {
        #[arg(value_parser = parse_turn)]
        turn: Turn,
    },
    /// Centre the steering, retrying until the car accepts it.
    ResetTurn,
}

/// Requested drive direction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    Forward,
    Reverse,
}

impl DirectionArg {
    fn to_direction(self) -> Direction {
        match self {
            Self::Forward => Direction::Forward,
            Self::Reverse => Direction::Reverse,
        }
    }
}

/// Executes the `drive` command.
#[instrument(skip(client, out, terminal_client, options), level = "info", fields(action = ?args.action))]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    args: &DriveArgs,
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
        .connect()
        .await?;
    let result = send(&view_model, args.action).await;
    view_model.shutdown().await;
    let result = result?;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", DriveResultView::new(&result, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &result)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

async fn send(view_model: &CarViewModel, action: DriveAction) -> Result<DriveResult, InteractionError> {
    let result = match action {
        DriveAction::Direction { direction } => {
            let direction = direction.to_direction();
            view_model.write_direction(direction).await;
            DriveResult::Direction {
                direction,
                byte: direction.byte(),
            }
        }
        DriveAction::Speed { speed } => {
            view_model.write_speed(Speed::from(speed)).await;
            DriveResult::Speed { speed }
        }
        DriveAction::Turn { turn } => {
            view_model.write_turn(turn.value()).await;
            DriveResult::Turn { turn: turn.value() }
        }
        DriveAction::ResetTurn => {
            reset_turn(view_model).await?;
            DriveResult::ResetTurn {
                turn: crate::protocol::NEUTRAL_TURN,
            }
        }
    };
    Ok(result)
}

/// Runs the retrying turn reset and waits for its outcome.
pub(crate) async fn reset_turn(view_model: &CarViewModel) -> Result<(), InteractionError> {
    let device_id = view_model
        .snapshot()
        .active_device()
        .map(|device| device.device_id().to_string())
        .unwrap_or_default();
    match view_model.reset_turn() {
        Some(handle) => reset_outcome(handle.await, device_id),
        None => Err(InteractionError::TurnResetFailed {
            device_id,
            attempts: RESET_TURN_ATTEMPTS,
        }),
    }
}

fn reset_outcome(
    joined: Result<bool, JoinError>,
    device_id: String,
) -> Result<(), InteractionError> {
    match joined {
        Ok(true) => Ok(()),
        Ok(false) => Err(InteractionError::TurnResetFailed {
            device_id,
            attempts: RESET_TURN_ATTEMPTS,
        }),
        Err(error) => {
            warn!(?error, "turn reset task ended abnormally");
            Err(InteractionError::TurnResetAborted { device_id })
        }
    }
}

fn parse_turn(value: &str) -> Result<Turn, String> {
    let value = value
        .parse::<u8>()
        .map_err(|error| format!("invalid turn `{value}`: {error}"))?;
    Turn::new(value).map_err(|error: CommandValueError| error.to_string())
}
