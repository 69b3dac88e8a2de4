use std::fmt::{self, Display, Formatter};

use crate::cli::drive::DriveResult;
use crate::cli::steer::SteerSummary;

use super::painter::Painter;
use super::table::Table;

/// Renders the outcome of one `drive` action as a single line.
pub(crate) struct DriveResultView<'a> {
    result: &'a DriveResult,
    painter: &'a Painter,
}

impl<'a> DriveResultView<'a> {
    pub(crate) fn new(result: &'a DriveResult, painter: &'a Painter) -> Self {
        Self { result, painter }
    }
}

impl Display for DriveResultView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (what, value) = match *self.result {
            DriveResult::Direction { direction, byte } => {
                ("direction", format!("{direction} ({byte})"))
            }
            DriveResult::Speed { speed } => ("speed", speed.to_string()),
            DriveResult::Turn { turn } => ("turn", turn.to_string()),
            DriveResult::ResetTurn { turn } => ("turn reset", turn.to_string()),
        };
        write!(
            f,
            "{} {} {}",
            self.painter.success("✓ Sent"),
            what,
            self.painter.value(value)
        )
    }
}

/// Renders a replayed steering gesture.
pub(crate) struct SteerSummaryView<'a> {
    summary: &'a SteerSummary,
    painter: &'a Painter,
}

impl<'a> SteerSummaryView<'a> {
    pub(crate) fn new(summary: &'a SteerSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for SteerSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let turns = if self.summary.turns_written().is_empty() {
            self.painter.warning("<none>")
        } else {
            let turns: Vec<String> = self
                .summary
                .turns_written()
                .iter()
                .map(ToString::to_string)
                .collect();
            self.painter.value(turns.join(", "))
        };
        let table = Table::key_value(
            self.painter,
            vec![
                ("steps", self.painter.value(self.summary.steps().to_string())),
                ("turns_written", turns),
                (
                    "final_angle",
                    self.painter.value(format!("{:.1}°", self.summary.final_angle())),
                ),
                (
                    "reset_turn",
                    self.painter.success(self.summary.reset_turn().to_string()),
                ),
            ],
        );

        write!(f, "{}", self.painter.heading("Steering replayed:"))?;
        write!(f, "\n{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;
    use crate::drive::Direction;

    #[rstest]
    #[case(DriveResult::Direction { direction: Direction::Reverse, byte: 1 }, "✓ Sent direction reverse (1)")]
    #[case(DriveResult::Speed { speed: 200 }, "✓ Sent speed 200")]
    #[case(DriveResult::Turn { turn: 45 }, "✓ Sent turn 45")]
    #[case(DriveResult::ResetTurn { turn: 90 }, "✓ Sent turn reset 90")]
    fn drive_result_line(#[case] result: DriveResult, #[case] expected: &str) {
        let painter = Painter::new(false);
        pretty_assertions::assert_eq!(
            expected,
            DriveResultView::new(&result, &painter).to_string()
        );
    }

    #[test]
    fn steer_summary_table() {
        let summary = SteerSummary::new(3, vec![100, 110], 15.0);
        let painter = Painter::new(false);

        assert_snapshot!(SteerSummaryView::new(&summary, &painter).to_string(), @r"
        Steering replayed:
        ╭───────────────┬──────────╮
        │ field         │ value    │
        ├───────────────┼──────────┤
        │ steps         │ 3        │
        │ turns_written │ 100, 110 │
        │ final_angle   │ 15.0°    │
        │ reset_turn    │ 90       │
        ╰───────────────┴──────────╯
        ");
    }
}
