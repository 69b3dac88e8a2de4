mod commands;
mod steering;

pub use self::commands::{Direction, Speed, Turn};
pub use self::steering::{
    DEFAULT_TURN_DEBOUNCE, DRAG_UNITS_PER_DEGREE, MAX_STEERING_ANGLE, SteerMode, SteeringWheel,
    TurnDebouncer, angle_for_turn_byte, turn_byte,
};
