//! The three remote operations a sync needs. The Strava and Sheets clients
//! implement these, tests substitute in-memory versions.

use stack_string::StackString;
use time::Date;

use sync_lib::{errors::SyncError as Error, sync_config::SheetTarget};

use crate::{strava_activity::StravaActivity, write_plan::CellWrite};

#[allow(async_fn_in_trait)]
pub trait ActivitySource {
    /// # Errors
    /// Return error if authentication or the request fails
    async fn list_activities(&self, since: Date) -> Result<Vec<StravaActivity>, Error>;
}

#[allow(async_fn_in_trait)]
pub trait SheetReader {
    /// Raw text of `column` (1-indexed), one entry per row starting at
    /// `first_row` (1-indexed). Blank cells come back as empty strings.
    ///
    /// # Errors
    /// Return error if authentication or the request fails
    async fn read_column(
        &self,
        sheet: &SheetTarget,
        column: usize,
        first_row: u32,
    ) -> Result<Vec<StackString>, Error>;
}

#[allow(async_fn_in_trait)]
pub trait SheetWriter {
    /// Write every cell in one request, returning the number of cells the
    /// remote side reports as updated.
    ///
    /// # Errors
    /// Return error if authentication or the request fails
    async fn batch_write(&self, sheet: &SheetTarget, cells: &[CellWrite]) -> Result<usize, Error>;
}
