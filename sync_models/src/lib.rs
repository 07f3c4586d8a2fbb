#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod normalized_run;
pub mod sheet_row_index;
pub mod strava_activity;
pub mod sync_capabilities;
pub mod write_plan;
