mod ui_state;
mod view_model;

pub use self::ui_state::{DriveReadiness, UiState};
pub use self::view_model::CarViewModel;
