use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{instrument, trace};

use crate::SessionHandler;
use crate::app::RunOptions;
use crate::cli::OutputFormat;
use crate::drive::{DEFAULT_TURN_DEBOUNCE, SteerMode, SteeringWheel, TurnDebouncer};
use crate::error::InteractionError;
use crate::hw::HardwareClient;
use crate::protocol::NEUTRAL_TURN;
use crate::terminal::TerminalClient;
use crate::view::CarViewModel;

use super::drive::reset_turn;
use super::ui::{Painter, SteerSummaryView};

const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(16);

/// Arguments for the `steer` command.
#[derive(Debug, Args)]
pub struct SteerArgs {
    /// Backend id of the car; defaults to the first car found.
    #[arg(long)]
    device: Option<String>,
    /// Minimum spacing between turn writes (e.g. `10ms`).
    #[arg(long, value_parser = super::command::parse_duration, conflicts_with = "stream")]
    debounce: Option<Duration>,
    /// Writes every turn update instead of debouncing.
    #[arg(long)]
    stream: bool,
    /// Pause between replayed drag steps (e.g. `16ms`).
    #[arg(long, default_value = "16ms", value_parser = super::command::parse_duration)]
    step_interval: Duration,
    /// Horizontal drag steps; five units turn the wheel by one degree.
    #[arg(required = true, allow_negative_numbers = true, num_args = 1..)]
    deltas: Vec<f32>,
}

impl SteerArgs {
    /// Creates steer arguments with the default debounce and step interval.
    ///
    /// ```
    /// let args = lambcar::SteerArgs::new(vec![50.0, -25.0]);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(deltas: Vec<f32>) -> Self {
        Self {
            device: None,
            debounce: None,
            stream: false,
            step_interval: DEFAULT_STEP_INTERVAL,
            deltas,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SteerMode) -> Self {
        match mode {
            SteerMode::Stream => {
                self.stream = true;
                self.debounce = None;
            }
            SteerMode::Debounced(interval) => {
                self.stream = false;
                self.debounce = Some(interval);
            }
        }
        self
    }

    #[must_use]
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    fn mode(&self) -> SteerMode {
        if self.stream {
            SteerMode::Stream
        } else {
            SteerMode::Debounced(self.debounce.unwrap_or(DEFAULT_TURN_DEBOUNCE))
        }
    }
}

/// Outcome of one replayed steering gesture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SteerSummary {
    steps: usize,
    turns_written: Vec<u8>,
    final_angle: f32,
    reset_turn: u8,
}

impl SteerSummary {
    pub(crate) fn new(steps: usize, turns_written: Vec<u8>, final_angle: f32) -> Self {
        Self {
            steps,
            turns_written,
            final_angle,
            reset_turn: NEUTRAL_TURN,
        }
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn turns_written(&self) -> &[u8] {
        &self.turns_written
    }

    pub(crate) fn final_angle(&self) -> f32 {
        self.final_angle
    }

    pub(crate) fn reset_turn(&self) -> u8 {
        self.reset_turn
    }
}

/// Executes the `steer` command.
#[instrument(skip(client, args, out, terminal_client, options), level = "info", fields(steps = args.deltas.len(), mode = ?args.mode()))]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    args: &SteerArgs,
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
    let summary = replay(&view_model, args).await;
    view_model.shutdown().await;
    let summary = summary?;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", SteerSummaryView::new(&summary, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &summary)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

/// Drags the wheel through `args.deltas`, then releases it and resets the turn.
async fn replay(
    view_model: &CarViewModel,
    args: &SteerArgs,
) -> Result<SteerSummary, InteractionError> {
    let mut wheel = SteeringWheel::new();
    let mut debouncer = TurnDebouncer::new(args.mode());
    let mut turns_written = Vec::new();

    for (index, dx) in args.deltas.iter().enumerate() {
        if index > 0 {
            sleep(args.step_interval).await;
        }
        wheel.drag(*dx);
        let turn = wheel.turn_byte();
        if debouncer.admit(Instant::now()) {
            view_model.write_turn(turn).await;
            turns_written.push(turn);
        } else {
            trace!(turn, "turn update debounced");
        }
    }

    let final_angle = wheel.angle();
    wheel.release();
    reset_turn(view_model).await?;

    Ok(SteerSummary::new(args.deltas.len(), turns_written, final_angle))
}
