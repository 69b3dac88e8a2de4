use std::time::Duration;

use tokio::time::Instant;

/// Largest wheel deflection either way, in degrees.
pub const MAX_STEERING_ANGLE: f32 = 90.0;
/// Horizontal drag distance that turns the wheel by one degree.
pub const DRAG_UNITS_PER_DEGREE: f32 = 5.0;
/// Default spacing between turn writes while dragging.
pub const DEFAULT_TURN_DEBOUNCE: Duration = Duration::from_millis(10);

/// Maps a wheel angle to the turn byte the car expects.
///
/// The angle is clamped to `[-90, 90]`, shifted by 90 and truncated toward
/// zero, so the result is always in `0..=180`.
///
/// ```
/// assert_eq!(0, lambcar::turn_byte(-90.0));
/// assert_eq!(90, lambcar::turn_byte(0.0));
/// assert_eq!(180, lambcar::turn_byte(250.0));
/// ```
#[must_use]
pub fn turn_byte(angle: f32) -> u8 {
    let angle = if angle.is_nan() { 0.0 } else { angle };
    // `as` truncates toward zero; the clamp keeps the sum inside u8.
    (angle.clamp(-MAX_STEERING_ANGLE, MAX_STEERING_ANGLE) + MAX_STEERING_ANGLE) as u8
}

/// Inverse of [`turn_byte`] over `0..=180`.
#[must_use]
pub fn angle_for_turn_byte(turn: u8) -> f32 {
    f32::from(turn) - MAX_STEERING_ANGLE
}

/// On-screen steering wheel driven by horizontal drags.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SteeringWheel {
    angle: f32,
}

impl SteeringWheel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current angle in degrees, within `[-90, 90]`.
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Applies one horizontal drag step and returns the new angle.
    ///
    /// Non-finite steps are ignored.
    pub fn drag(&mut self, dx: f32) -> f32 {
        if dx.is_finite() {
            self.angle = (self.angle + dx / DRAG_UNITS_PER_DEGREE)
                .clamp(-MAX_STEERING_ANGLE, MAX_STEERING_ANGLE);
        }
        self.angle
    }

    /// Centres the wheel. The caller follows up with a turn reset.
    pub fn release(&mut self) {
        self.angle = 0.0;
    }

    #[must_use]
    pub fn turn_byte(&self) -> u8 {
        turn_byte(self.angle)
    }
}

/// How turn updates are forwarded to the car while dragging.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SteerMode {
    /// Every update is written.
    Stream,
    /// An update is written only if more than the interval has passed since
    /// the last written one.
    Debounced(Duration),
}

impl Default for SteerMode {
    fn default() -> Self {
        Self::Debounced(DEFAULT_TURN_DEBOUNCE)
    }
}

/// Gate deciding which turn updates become writes.
#[derive(Debug, Clone)]
pub struct TurnDebouncer {
    mode: SteerMode,
    last_write: Option<Instant>,
}

impl TurnDebouncer {
    #[must_use]
    pub fn new(mode: SteerMode) -> Self {
        Self {
            mode,
            last_write: None,
        }
    }

    /// Returns whether an update at `now` should be written, and records it
    /// if so. The first update is always admitted.
    pub fn admit(&mut self, now: Instant) -> bool {
        let admitted = match (self.mode, self.last_write) {
            (SteerMode::Stream, _) | (_, None) => true,
            (SteerMode::Debounced(interval), Some(last_write)) => {
                now.saturating_duration_since(last_write) > interval
            }
        };
        if admitted {
            self.last_write = Some(now);
        }
        admitted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::small_right(&[25.0], 5.0)]
    #[case::small_left(&[-25.0], -5.0)]
    #[case::accumulates(&[50.0, 50.0, -25.0], 15.0)]
    #[case::clamps_right(&[10_000.0], 90.0)]
    #[case::clamps_left(&[-10_000.0], -90.0)]
    #[case::recovers_from_clamp(&[10_000.0, -50.0], 80.0)]
    #[case::ignores_nan(&[25.0, f32::NAN], 5.0)]
    fn drag_accumulates_and_clamps(#[case] steps: &[f32], #[case] expected: f32) {
        let mut wheel = SteeringWheel::new();
        for step in steps {
            wheel.drag(*step);
        }
        assert_eq!(expected, wheel.angle());
    }

    #[test]
    fn drag_never_leaves_valid_range() {
        let mut wheel = SteeringWheel::new();
        for step in [333.0, 1_000.0, -7.5, -4_000.0, 12.0, f32::INFINITY, 0.1] {
            let angle = wheel.drag(step);
            assert!((-MAX_STEERING_ANGLE..=MAX_STEERING_ANGLE).contains(&angle));
        }
    }

    #[test]
    fn release_centres_the_wheel() {
        let mut wheel = SteeringWheel::new();
        wheel.drag(200.0);
        wheel.release();
        assert_eq!(0.0, wheel.angle());
        assert_eq!(90, wheel.turn_byte());
    }

    #[rstest]
    #[case(-90.0, 0)]
    #[case(-45.5, 44)]
    #[case(0.0, 90)]
    #[case(0.9, 90)]
    #[case(44.7, 134)]
    #[case(90.0, 180)]
    #[case(f32::NAN, 90)]
    fn turn_byte_offsets_and_truncates(#[case] angle: f32, #[case] expected: u8) {
        assert_eq!(expected, turn_byte(angle));
    }

    #[test]
    fn turn_byte_is_a_bijection_over_integer_angles() {
        let bytes: Vec<u8> = (-90..=90).map(|angle| turn_byte(angle as f32)).collect();
        let distinct: HashSet<u8> = bytes.iter().copied().collect();

        assert_eq!(181, distinct.len());
        assert_eq!((0..=180).collect::<Vec<u8>>(), bytes);
        for turn in 0..=180u8 {
            assert_eq!(turn, turn_byte(angle_for_turn_byte(turn)));
        }
    }

    #[test]
    fn stream_mode_admits_everything() {
        let mut debouncer = TurnDebouncer::new(SteerMode::Stream);
        let now = Instant::now();
        assert!(debouncer.admit(now));
        assert!(debouncer.admit(now));
    }

    #[test]
    fn debounced_mode_needs_strictly_more_than_interval() {
        let interval = Duration::from_millis(10);
        let mut debouncer = TurnDebouncer::new(SteerMode::Debounced(interval));
        let start = Instant::now();

        assert!(debouncer.admit(start));
        assert!(!debouncer.admit(start + Duration::from_millis(5)));
        assert!(!debouncer.admit(start + interval));
        assert!(debouncer.admit(start + Duration::from_millis(11)));
        assert!(!debouncer.admit(start + Duration::from_millis(15)));
    }
}
