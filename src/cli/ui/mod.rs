mod device_view;
mod drive_view;
mod inspect_view;
mod painter;
mod table;

pub(crate) use self::device_view::ScanView;
pub(crate) use self::drive_view::{DriveResultView, SteerSummaryView};
pub(crate) use self::inspect_view::InspectView;
pub(crate) use self::painter::Painter;
